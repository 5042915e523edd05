use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::bibtex::{normalize_title, EntryKind};
use crate::config::DEFAULT_ROWS;
use crate::lookup::{Work, WorkLookup};

/// Canonical field name to value, built from one candidate record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMetadata {
    fields: HashMap<String, String>,
}

impl ResolvedMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a record's attributes onto canonical field names.
    pub fn from_work(work: &Work) -> Self {
        let mut resolved = Self::new();
        resolved.insert("author", work.author_list());
        resolved.insert("title", work.title.clone());
        resolved.insert("journal", work.container_title.clone());
        resolved.insert("booktitle", work.container_title.clone());
        resolved.insert("pages", work.page.clone());
        resolved.insert("article_number", work.article_number.clone());
        resolved.insert("publisher", work.publisher.clone());
        resolved.insert("volume", work.volume.clone());
        resolved.insert("number", work.issue.clone());
        resolved.insert("year", work.year.map(|y| y.to_string()));
        resolved.insert("doi", work.identifier().map(str::to_string));
        resolved
    }

    /// Set `name` unless `value` is absent or blank.
    pub fn insert(&mut self, name: &str, value: Option<String>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.fields.insert(name.to_string(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResolvedMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut resolved = Self::new();
        for (name, value) in iter {
            let name = name.into();
            resolved.insert(&name, Some(value.into()));
        }
        resolved
    }
}

/// Pick the record to use: proceedings records first for conference-like kinds
/// (when there are any), then the first one carrying an identifier, else the first.
pub fn select_candidate(candidates: &[Work], kind: Option<EntryKind>) -> Option<&Work> {
    let mut pool: Vec<&Work> = Vec::new();
    if kind.is_some_and(EntryKind::is_proceedings) {
        pool = candidates.iter().filter(|w| w.is_proceedings()).collect();
    }
    if pool.is_empty() {
        pool = candidates.iter().collect();
    }
    pool.iter()
        .find(|w| w.identifier().is_some())
        .or_else(|| pool.first())
        .copied()
}

/// Resolves titles to metadata, one lookup per normalized title per run.
pub struct MetadataResolver<L> {
    lookup: L,
    rows: usize,
    cache: Mutex<HashMap<String, ResolvedMetadata>>,
}

impl<L: WorkLookup> MetadataResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self::with_rows(lookup, DEFAULT_ROWS)
    }

    pub fn with_rows(lookup: L, rows: usize) -> Self {
        Self {
            lookup,
            rows,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn cached(&self, title: &str) -> Option<ResolvedMetadata> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(&normalize_title(title)).cloned()
    }

    /// First write for a key wins; later writers get the stored value back.
    fn store(&self, key: String, resolved: ResolvedMetadata) -> ResolvedMetadata {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.entry(key).or_insert(resolved).clone()
    }

    /// Metadata for `title`. Lookup failures are logged and yield empty metadata
    /// (not cached, so a later call may try again).
    pub async fn resolve(&self, title: &str, kind: Option<EntryKind>) -> ResolvedMetadata {
        let key = normalize_title(title);
        if key.is_empty() {
            return ResolvedMetadata::new();
        }
        if let Some(hit) = self.cached(&key) {
            debug!("Metadata cache hit for: {}", key);
            return hit;
        }

        let candidates = match self.lookup.search(title, self.rows).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Lookup failed for '{}': {}", title, e);
                return ResolvedMetadata::new();
            }
        };

        let resolved = select_candidate(&candidates, kind)
            .map(ResolvedMetadata::from_work)
            .unwrap_or_default();
        if resolved.is_empty() {
            debug!("No usable candidate for: {}", title);
        }
        self.store(key, resolved)
    }
}
