pub mod crossref;
pub mod resolver;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BibFillError;

pub use crossref::CrossrefClient;
pub use resolver::{MetadataResolver, ResolvedMetadata};

/// Suffix of identifiers the service hands out for video abstracts and other
/// non-article media.
pub const REJECTED_IDENTIFIER_SUFFIX: &str = ".vid";

/// Record types that count as conference papers.
const PROCEEDINGS_TYPES: [&str; 3] = ["proceedings-article", "proceedings", "proceedings-series"];

/// A bibliographic search service.
#[async_trait]
pub trait WorkLookup: Send + Sync {
    /// Up to `rows` candidate records for `query`, in the service's relevance order.
    async fn search(&self, query: &str, rows: usize) -> Result<Vec<Work>, BibFillError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Author {
    pub given: Option<String>,
    pub family: Option<String>,
    /// Organisation name for corporate authors.
    pub name: Option<String>,
}

impl Author {
    pub fn from_json(v: &Value) -> Self {
        Self {
            given: first_string(&v["given"]),
            family: first_string(&v["family"]),
            name: first_string(&v["name"]),
        }
    }

    /// `Family, Given`, or whatever part is available.
    pub fn display(&self) -> Option<String> {
        match (&self.family, &self.given, &self.name) {
            (Some(family), Some(given), _) => Some(format!("{}, {}", family, given)),
            (Some(family), None, _) => Some(family.clone()),
            (None, _, Some(name)) => Some(name.clone()),
            (None, Some(given), None) => Some(given.clone()),
            (None, None, None) => None,
        }
    }
}

/// One candidate record returned by the lookup service. Every attribute is
/// optional; nothing here fails on an unexpected shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Work {
    pub doi: Option<String>,
    pub title: Option<String>,
    pub container_title: Option<String>,
    pub page: Option<String>,
    pub article_number: Option<String>,
    pub authors: Vec<Author>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub year: Option<i32>,
    pub work_type: Option<String>,
}

impl Work {
    pub fn from_json(v: &Value) -> Self {
        let authors = v["author"]
            .as_array()
            .map(|a| a.iter().map(Author::from_json).collect())
            .unwrap_or_default();

        let year = date_year(&v["published-print"])
            .or_else(|| date_year(&v["published-online"]))
            .or_else(|| date_year(&v["issued"]));

        Self {
            doi: first_string(&v["DOI"]),
            title: first_string(&v["title"]),
            container_title: first_string(&v["container-title"]),
            page: first_string(&v["page"]),
            article_number: first_string(&v["article-number"]),
            authors,
            publisher: first_string(&v["publisher"]),
            volume: first_string(&v["volume"]),
            issue: first_string(&v["issue"]),
            year,
            work_type: first_string(&v["type"]),
        }
    }

    /// The identifier, unless it is empty or one of the rejected media identifiers.
    pub fn identifier(&self) -> Option<&str> {
        self.doi
            .as_deref()
            .filter(|doi| !doi.ends_with(REJECTED_IDENTIFIER_SUFFIX))
    }

    pub fn is_proceedings(&self) -> bool {
        self.work_type
            .as_deref()
            .is_some_and(|t| PROCEEDINGS_TYPES.contains(&t))
    }

    /// Authors joined the way reference files expect them.
    pub fn author_list(&self) -> Option<String> {
        let names: Vec<String> = self.authors.iter().filter_map(Author::display).collect();
        (!names.is_empty()).then(|| names.join(" and "))
    }
}

/// A trimmed, non-empty string from a string, a number, or the first element of an array.
pub fn first_string(v: &Value) -> Option<String> {
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => return items.first().and_then(first_string),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Year from the first `[year, month, day]` triple of a `date-parts` structure.
pub fn date_year(v: &Value) -> Option<i32> {
    let year = &v["date-parts"][0][0];
    year.as_i64()
        .and_then(|y| i32::try_from(y).ok())
        .or_else(|| year.as_str().and_then(|s| s.trim().parse().ok()))
}
