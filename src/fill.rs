use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fmt;

use crate::bibtex::{normalize_title, Bibliography, Entry, EntryKind};
use crate::lookup::{MetadataResolver, ResolvedMetadata, WorkLookup};

/// Outcome for one entry after the fill pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Complete before any lookup.
    Pass,
    /// Became complete through merged metadata.
    Updated,
    /// Still missing required fields.
    Warning,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pass => "PASS",
            Self::Updated => "UPDATED",
            Self::Warning => "WARNING",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub key: String,
    pub status: EntryStatus,
    pub missing: Vec<&'static str>,
    pub duplicates: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FillReport {
    pub entries: Vec<EntryReport>,
    /// Number of title groups sent to the resolver.
    pub lookups: usize,
}

impl FillReport {
    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} entries: {} passed, {} updated, {} with warnings ({} lookups)",
            self.entries.len(),
            self.count(EntryStatus::Pass),
            self.count(EntryStatus::Updated),
            self.count(EntryStatus::Warning),
            self.lookups
        )
    }
}

/// Indices of incomplete, titled entries keyed by normalized title.
pub fn group_by_title(bibliography: &Bibliography) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, entry) in bibliography.iter().enumerate() {
        if entry.is_complete() {
            continue;
        }
        let key = normalize_title(&entry.local_title());
        if key.is_empty() {
            warn!("Entry '{}' has no title, skipping lookup", entry.key());
            continue;
        }
        groups.entry(key).or_default().push(idx);
    }
    groups
}

fn scrub_all(bibliography: &mut Bibliography) {
    for entry in bibliography.iter_mut() {
        if entry.scrub() {
            info!("Removed journal field from tech report '{}'", entry.key());
        }
    }
}

/// Look up metadata for every incomplete entry and merge it in.
///
/// One lookup runs per normalized title, at most `concurrency` at a time. All
/// results, including empty ones from failed lookups, are collected before any
/// entry is touched.
pub async fn complete_bibliography<L: WorkLookup>(
    bibliography: &mut Bibliography,
    resolver: &MetadataResolver<L>,
    concurrency: usize,
) -> FillReport {
    let was_complete: Vec<bool> = bibliography.iter().map(Entry::is_complete).collect();
    scrub_all(bibliography);

    let requests: Vec<(Vec<usize>, String, EntryKind)> = group_by_title(bibliography)
        .into_values()
        .map(|indices| {
            let first = &bibliography.entries[indices[0]];
            let (title, kind) = (first.local_title(), first.kind());
            (indices, title, kind)
        })
        .collect();
    let lookups = requests.len();
    info!("Resolving {} distinct titles", lookups);

    let results: Vec<(Vec<usize>, ResolvedMetadata)> = stream::iter(requests)
        .map(|(indices, title, kind)| async move {
            let resolved = resolver.resolve(&title, Some(kind)).await;
            (indices, resolved)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for (indices, resolved) in &results {
        for &idx in indices {
            bibliography.entries[idx].merge_metadata(resolved);
        }
    }

    build_report(bibliography, &was_complete, lookups)
}

/// Reformat without any lookups.
pub fn reformat_only(bibliography: &mut Bibliography) -> FillReport {
    let was_complete: Vec<bool> = bibliography.iter().map(Entry::is_complete).collect();
    scrub_all(bibliography);
    build_report(bibliography, &was_complete, 0)
}

fn build_report(bibliography: &Bibliography, was_complete: &[bool], lookups: usize) -> FillReport {
    let entries = bibliography
        .iter()
        .zip(was_complete)
        .map(|(entry, &was_complete)| {
            let missing = entry.missing_fields();
            let status = if was_complete {
                EntryStatus::Pass
            } else if missing.is_empty() {
                EntryStatus::Updated
            } else {
                EntryStatus::Warning
            };

            let duplicates = entry.duplicate_fields();
            if !duplicates.is_empty() {
                warn!("Entry '{}' repeats fields: {}", entry.key(), duplicates.join(", "));
            }
            match status {
                EntryStatus::Warning => warn!("{} {} (missing: {})", status, entry.key(), missing.join(", ")),
                _ => info!("{} {}", status, entry.key()),
            }

            EntryReport {
                key: entry.key().to_string(),
                status,
                missing,
                duplicates,
            }
        })
        .collect();

    FillReport { entries, lookups }
}
