use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::config::LookupConfig;
use crate::error::BibFillError;
use crate::lookup::{Work, WorkLookup};

/// Crossref `/works` search client.
pub struct CrossrefClient {
    http: Client,
    config: LookupConfig,
}

impl CrossrefClient {
    pub fn new(config: LookupConfig) -> Result<Self, BibFillError> {
        let http = Client::builder()
            .user_agent(config.user_agent())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(self.config.timeout),
            ..Default::default()
        }
    }
}

/// Pull `message.items` out of a `/works` response.
pub fn parse_works(response: &Value) -> Result<Vec<Work>, BibFillError> {
    let items = response
        .get("message")
        .and_then(|m| m.get("items"))
        .and_then(|i| i.as_array())
        .ok_or_else(|| BibFillError::MalformedResponse("missing message.items".to_string()))?;
    Ok(items.iter().map(Work::from_json).collect())
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl WorkLookup for CrossrefClient {
    async fn search(&self, query: &str, rows: usize) -> Result<Vec<Work>, BibFillError> {
        let url = format!("{}/works", self.config.base_url.trim_end_matches('/'));
        let rows = rows.to_string();

        let operation = || async {
            info!("Querying Crossref for: {}", query);
            let response = self
                .http
                .get(&url)
                .query(&[("query.bibliographic", query), ("rows", rows.as_str())])
                .send()
                .await
                .map_err(|e| backoff::Error::transient(BibFillError::NetworkError(e)))?;

            let status = response.status();
            if !status.is_success() {
                warn!("Crossref API returned status {}", status);
                let error = BibFillError::ApiError(format!("Crossref API returned status {}", status));
                return Err(if is_transient(status) {
                    backoff::Error::transient(error)
                } else {
                    backoff::Error::permanent(error)
                });
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| backoff::Error::permanent(BibFillError::NetworkError(e)))?;
            parse_works(&body).map_err(backoff::Error::permanent)
        };

        let works = retry(self.backoff(), operation).await?;
        debug!("Crossref returned {} candidates for: {}", works.len(), query);
        Ok(works)
    }
}
