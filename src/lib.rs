//! Normalize and complete reference files: parse entries, fill missing required
//! fields from Crossref, and re-serialize everything with uniform alignment.

pub mod bibtex;
pub mod config;
pub mod error;
pub mod fill;
pub mod lookup;

pub use bibtex::{Bibliography, Entry, EntryKind};
pub use error::BibFillError;
pub use fill::{complete_bibliography, reformat_only, EntryStatus, FillReport};
pub use lookup::{CrossrefClient, MetadataResolver, ResolvedMetadata, WorkLookup};
