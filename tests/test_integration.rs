use async_trait::async_trait;
use bibfill::config::LookupConfig;
use bibfill::lookup::{Work, WorkLookup};
use bibfill::{complete_bibliography, reformat_only, BibFillError, Bibliography, CrossrefClient, EntryStatus, MetadataResolver};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const MOCK_BIB_CONTENT: &str = r#"@article{smith2020flow,
  title={Flow in Pipes},
  author={Smith, John},
  year={2020}
}

@article{smith2020flow_dup,
  title = {Flow in  {P}ipes},
  author = {Smith, John},
  year = {2020},
}

@book{doe1999,
  author={Doe, Jane},
  title={A Complete Book},
  year={1999},
  publisher={Press}
}

@techreport{tr2001,
  author={Roe, R.},
  title={Some Report},
  year={2001},
  journal={Not A Journal}
}
"#;

fn test_config(base_url: String) -> LookupConfig {
    LookupConfig {
        base_url,
        timeout: Duration::from_secs(1),
        ..LookupConfig::default()
    }
}

fn works_response() -> String {
    json!({
        "status": "ok",
        "message": {
            "items": [
                {
                    "DOI": "10.1017/jfm.2020.1",
                    "title": ["Flow in Pipes"],
                    "container-title": ["Journal of Fluid Mechanics"],
                    "page": "1-10",
                    "volume": "5",
                    "issue": "2",
                    "published-print": { "date-parts": [[2020, 3, 1]] },
                    "type": "journal-article"
                }
            ]
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_crossref_search_parses_items() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/works")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("query.bibliographic".into(), "Flow in Pipes".into()),
            Matcher::UrlEncoded("rows".into(), "3".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(works_response())
        .expect(1)
        .create_async()
        .await;

    let client = CrossrefClient::new(test_config(server.url())).unwrap();
    let works = client.search("Flow in Pipes", 3).await.unwrap();

    assert_eq!(works.len(), 1);
    assert_eq!(works[0].doi.as_deref(), Some("10.1017/jfm.2020.1"));
    assert_eq!(works[0].year, Some(2020));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_crossref_client_error_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/works")
        .match_query(Matcher::Any)
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let client = CrossrefClient::new(test_config(server.url())).unwrap();
    let result = client.search("Flow in Pipes", 3).await;

    assert!(matches!(result, Err(BibFillError::ApiError(_))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_crossref_server_error_is_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/works")
        .match_query(Matcher::Any)
        .with_status(500)
        .expect_at_least(2)
        .create_async()
        .await;

    let client = CrossrefClient::new(test_config(server.url())).unwrap();
    let result = client.search("Flow in Pipes", 3).await;

    assert!(matches!(result, Err(BibFillError::ApiError(_))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_crossref_malformed_body() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/works")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status": "ok"}"#)
        .create_async()
        .await;

    let client = CrossrefClient::new(test_config(server.url())).unwrap();
    let result = client.search("Flow in Pipes", 3).await;

    assert!(matches!(result, Err(BibFillError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_full_pipeline_with_mocked_crossref() {
    let mut server = Server::new_async().await;
    // both smith2020 entries normalize to the same title
    let mock = server
        .mock("GET", "/works")
        .match_query(Matcher::UrlEncoded("rows".into(), "3".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(works_response())
        .expect(1)
        .create_async()
        .await;

    let mut bibliography = Bibliography::parse(MOCK_BIB_CONTENT);
    assert_eq!(bibliography.len(), 4);

    let resolver = MetadataResolver::new(CrossrefClient::new(test_config(server.url())).unwrap());
    let report = complete_bibliography(&mut bibliography, &resolver, 5).await;
    mock.assert_async().await;

    assert_eq!(report.lookups, 1);
    let statuses: Vec<EntryStatus> = report.entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![EntryStatus::Updated, EntryStatus::Updated, EntryStatus::Pass, EntryStatus::Pass]
    );

    let output = bibliography.render();
    assert_eq!(output.matches("doi              = {10.1017/jfm.2020.1},").count(), 2);
    assert!(output.contains("    journal          = {Journal of Fluid Mechanics},"));
    assert!(!output.contains("Not A Journal"));
    assert!(output.ends_with("}\n"));
}

#[tokio::test]
async fn test_pipeline_with_network_failures() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/works")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let mut bibliography = Bibliography::parse(MOCK_BIB_CONTENT);
    let resolver = MetadataResolver::new(CrossrefClient::new(test_config(server.url())).unwrap());
    let report = complete_bibliography(&mut bibliography, &resolver, 5).await;

    assert_eq!(report.count(EntryStatus::Warning), 2);
    assert_eq!(report.count(EntryStatus::Pass), 2);
    let first = &report.entries[0];
    assert_eq!(first.missing, vec!["journal", "pages", "volume", "number", "doi"]);
    assert!(!bibliography.render().contains("Not A Journal"));
}

/// Answers every search after a short delay and records how many searches
/// were running at once.
#[derive(Default)]
struct SlowLookup {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl WorkLookup for SlowLookup {
    async fn search(&self, query: &str, _rows: usize) -> Result<Vec<Work>, BibFillError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(20)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let work = Work::from_json(&json!({
            "DOI": format!("10.1/{}", query.replace(' ', "-")),
            "title": [query],
            "container-title": ["Journal of Distinct Titles"],
            "page": "1-10",
            "volume": "5",
            "issue": "2",
        }));
        Ok(vec![work])
    }
}

#[tokio::test]
async fn test_lookups_respect_concurrency_limit() {
    let content: String = (0..10)
        .map(|i| format!("@article{{a{i},\n  title = {{Distinct Title {i}}},\n  author = {{Smith, J.}},\n  year = {{2020}}\n}}\n\n"))
        .collect();
    let mut bibliography = Bibliography::parse(&content);
    assert_eq!(bibliography.len(), 10);

    let resolver = MetadataResolver::new(SlowLookup::default());
    let report = complete_bibliography(&mut bibliography, &resolver, 3).await;

    let lookup = resolver.lookup();
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 10);
    assert_eq!(lookup.in_flight.load(Ordering::SeqCst), 0);
    let peak = lookup.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency was {peak}");
    assert!(peak > 1, "lookups never overlapped");

    // every result is merged before the call returns
    assert_eq!(report.lookups, 10);
    assert_eq!(report.count(EntryStatus::Updated), 10);
    for (i, entry) in bibliography.iter().enumerate() {
        assert_eq!(entry.field_value("doi").unwrap(), format!("10.1/Distinct-Title-{i}"));
    }
}

#[test]
fn test_reformat_only_makes_no_lookups() {
    let mut bibliography = Bibliography::parse(MOCK_BIB_CONTENT);
    let report = reformat_only(&mut bibliography);

    assert_eq!(report.lookups, 0);
    assert_eq!(report.count(EntryStatus::Warning), 2);
    assert!(report.summary().starts_with("4 entries: 2 passed, 0 updated, 2 with warnings"));
    assert!(!bibliography.render().contains("Not A Journal"));
}
