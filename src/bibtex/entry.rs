use log::debug;
use std::collections::HashMap;

use crate::bibtex::format::{format_field, trim_value};
use crate::bibtex::{collapse_whitespace, strip_braces, titles_match};
use crate::lookup::ResolvedMetadata;

/// Field holding the external unique identifier.
pub const IDENTIFIER_FIELD: &str = "doi";
/// Name under which unparseable leading text is kept.
pub const UNKNOWN_FIELD: &str = "unknown";
/// Canonical name for article numbers; stands in for pages when those are missing.
pub const ARTICLE_NUMBER_FIELD: &str = "article_number";

/// Citation type of an entry, fixed when the header is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Article,
    Book,
    InProceedings,
    TechReport,
    PhdThesis,
    MastersThesis,
    Conference,
    Unpublished,
    InCollection,
    Generic,
}

impl EntryKind {
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "article" => Self::Article,
            "book" => Self::Book,
            "inproceedings" => Self::InProceedings,
            "techreport" => Self::TechReport,
            "phdthesis" => Self::PhdThesis,
            "mastersthesis" => Self::MastersThesis,
            "conference" => Self::Conference,
            "unpublished" => Self::Unpublished,
            "incollection" => Self::InCollection,
            _ => Self::Generic,
        }
    }

    /// Classify a header such as `@article{key,` by the text between `@` and the first brace.
    pub fn from_header(header: &str) -> Self {
        let Some(rest) = header.trim_start().strip_prefix('@') else {
            return Self::Generic;
        };
        let type_name = match rest.find('{') {
            Some(idx) => &rest[..idx],
            None => rest.split(|c: char| c.is_whitespace() || c == ',').next().unwrap_or(""),
        };
        Self::from_type_name(type_name)
    }

    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Article => &["author", "title", "year", "journal", "pages", "volume", "number", "doi"],
            Self::Book => &["author", "title", "year", "publisher"],
            Self::InProceedings => &["author", "title", "year", "doi", "pages"],
            Self::TechReport => &["author", "title", "year"],
            Self::PhdThesis | Self::MastersThesis => &["author", "title", "school", "year"],
            Self::Conference => &["author", "title", "booktitle", "year"],
            Self::Unpublished => &["author", "title", "year"],
            Self::InCollection => &["author", "title", "booktitle", "publisher", "year"],
            Self::Generic => &["doi", "title", "journal", "pages", "volume", "number", "year"],
        }
    }

    /// Kinds whose candidates are narrowed to proceedings records.
    pub fn is_proceedings(self) -> bool {
        matches!(self, Self::InProceedings | Self::Conference)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// Raw text after `=`, including any trailing separator.
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One bibliographic record.
#[derive(Debug, Clone)]
pub struct Entry {
    header: String,
    kind: EntryKind,
    fields: Vec<Field>,
    closing: Option<String>,
    trailer: Option<String>,
}

impl Entry {
    pub fn new(header: impl Into<String>) -> Self {
        let header = header.into();
        let kind = EntryKind::from_header(&header);
        Self {
            header,
            kind,
            fields: Vec::new(),
            closing: None,
            trailer: None,
        }
    }

    pub(crate) fn from_parts(
        header: String,
        fields: Vec<Field>,
        closing: Option<String>,
        trailer: Option<String>,
    ) -> Self {
        Self {
            fields,
            closing,
            trailer,
            ..Self::new(header)
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn closing(&self) -> Option<&str> {
        self.closing.as_deref()
    }

    /// Citation key from the header, empty if the header has none.
    pub fn key(&self) -> &str {
        self.header
            .split_once('{')
            .map(|(_, rest)| rest.split([',', '}']).next().unwrap_or("").trim())
            .unwrap_or("")
    }

    /// First field named `name` (case-insensitive), with one enclosing brace or
    /// quote pair and trailing separators removed.
    pub fn field_value(&self, name: &str) -> Option<String> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .map(|field| unwrap_value(&field.value))
    }

    pub fn local_title(&self) -> String {
        self.field_value("title")
            .map(|title| collapse_whitespace(&strip_braces(&title)))
            .unwrap_or_default()
    }

    fn has_value(&self, name: &str) -> bool {
        self.field_value(name).is_some_and(|value| !value.is_empty())
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        self.kind.required_fields()
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.required_fields()
            .iter()
            .copied()
            .filter(|name| !self.has_value(name))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Lowercased names that occur more than once. Lookups keep using the first occurrence.
    pub fn duplicate_fields(&self) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut order = Vec::new();
        for field in &self.fields {
            let name = field.name.to_lowercase();
            let count = counts.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 2 {
                order.push(name);
            }
        }
        order
    }

    /// Drop fields that never belong to this kind. Only tech reports have any: a
    /// journal on a tech report is noise. Returns whether anything was removed.
    pub fn scrub(&mut self) -> bool {
        if self.kind != EntryKind::TechReport {
            return false;
        }
        let before = self.fields.len();
        self.fields.retain(|field| !field.name.eq_ignore_ascii_case("journal"));
        before != self.fields.len()
    }

    /// Fill missing required fields from `resolved`. Existing values are never
    /// replaced; new fields go after all existing ones.
    pub fn merge_metadata(&mut self, resolved: &ResolvedMetadata) -> bool {
        self.scrub();

        let local_title = self.local_title();
        let mut added = false;

        for &name in self.kind.required_fields() {
            if self.has_value(name) {
                continue;
            }
            let Some(value) = resolved.get(name) else {
                continue;
            };
            if name == IDENTIFIER_FIELD {
                if let Some(candidate_title) = resolved.title() {
                    if !titles_match(&local_title, candidate_title) {
                        debug!(
                            "Skipping {} for '{}': candidate title '{}' does not match",
                            IDENTIFIER_FIELD, local_title, candidate_title
                        );
                        continue;
                    }
                }
            }
            self.add_field(name, value);
            added = true;
        }

        if self.kind.required_fields().contains(&"pages") && !self.has_value("pages") {
            if let Some(article_number) = resolved.get(ARTICLE_NUMBER_FIELD) {
                self.add_field("pages", article_number);
                added = true;
            }
        }

        added
    }

    /// Fill an empty placeholder in place, otherwise append.
    fn add_field(&mut self, name: &str, value: &str) {
        let value = format!("{{{}}}", value);
        match self
            .fields
            .iter_mut()
            .find(|field| field.name.eq_ignore_ascii_case(name))
        {
            Some(field) => field.value = value,
            None => self.fields.push(Field::new(name, value)),
        }
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.fields.len() + 3);
        lines.push(self.header.clone());
        lines.extend(self.fields.iter().map(|field| format_field(&field.name, &field.value)));
        if let Some(closing) = &self.closing {
            lines.push(closing.clone());
        }
        if let Some(trailer) = &self.trailer {
            lines.push(trailer.clone());
        }
        lines.join("\n")
    }
}

fn unwrap_value(raw: &str) -> String {
    let value = trim_value(raw);
    let inner = if encloses(value, '{', '}') || encloses(value, '"', '"') {
        &value[1..value.len() - 1]
    } else {
        value
    };
    inner.trim().to_string()
}

/// Whether `value` is wrapped in a single `open`..`close` pair spanning the whole text.
fn encloses(value: &str, open: char, close: char) -> bool {
    if value.len() < 2 || !value.starts_with(open) || !value.ends_with(close) {
        return false;
    }
    if open == close {
        return true;
    }
    let inner = &value[1..value.len() - 1];
    let mut depth = 0usize;
    for c in inner.chars() {
        if c == open {
            depth += 1;
        } else if c == close {
            if depth == 0 {
                return false;
            }
            depth -= 1;
        }
    }
    depth == 0
}
