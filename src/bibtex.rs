pub mod entry;
pub mod format;
pub mod parser;

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

pub use entry::{Entry, EntryKind, Field};
pub use format::{format_field, INDENT_POST, INDENT_PRE};
pub use parser::parse_entry;

// Commonly used regex patterns compiled once
static FIELD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_:.+\-]*)\s*=\s*(.*?)\s*$").expect("Invalid field regex pattern")
});
static DASH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\u{2010}-\u{2015}]").expect("Invalid dash regex pattern")
});
static ENTRY_START_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*@[A-Za-z]+\s*\{").expect("Invalid entry start regex pattern")
});
static HYPHEN_RUN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-{2,}").expect("Invalid hyphen run regex pattern")
});

/// Remove every curly brace from `text`.
pub fn strip_braces(text: &str) -> String {
    text.replace(['{', '}'], "")
}

/// Replace every whitespace run with a single space and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Normalize a title for comparison and grouping: lowercase, every dash variant
/// becomes a hyphen, hyphen runs collapse to one, braces are dropped.
pub fn normalize_title(title: &str) -> String {
    let lowered = strip_braces(title).to_lowercase();
    let unified = DASH_REGEX.replace_all(&lowered, "-");
    let collapsed = HYPHEN_RUN_REGEX.replace_all(&unified, "-");
    collapse_whitespace(&collapsed)
}

/// Title-similarity guard: the normalized local title must appear inside the
/// normalized candidate title. An empty local title never matches.
pub fn titles_match(local: &str, candidate: &str) -> bool {
    let local = normalize_title(local);
    if local.is_empty() {
        return false;
    }
    normalize_title(candidate).contains(&local)
}

fn brace_depth(mut depth: usize, line: &str) -> usize {
    for c in line.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

/// A whole reference file: optional leading text followed by its entries in
/// document order.
#[derive(Debug, Clone, Default)]
pub struct Bibliography {
    pub preamble: Option<String>,
    pub entries: Vec<Entry>,
}

impl Bibliography {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `content` on `@type{` lines and parse each block. A marker line
    /// inside an open brace value belongs to that value.
    pub fn parse(content: &str) -> Self {
        let mut preamble = Vec::new();
        let mut blocks: Vec<Vec<&str>> = Vec::new();
        // brace depth of the current block; 1 is the entry body itself
        let mut depth = 0usize;

        for line in content.lines() {
            if depth < 2 && ENTRY_START_REGEX.is_match(line) {
                depth = 0;
                blocks.push(vec![line.trim_start()]);
            } else if let Some(block) = blocks.last_mut() {
                block.push(line);
            } else {
                preamble.push(line);
                continue;
            }
            depth = brace_depth(depth, line);
        }

        let preamble = preamble.join("\n").trim().to_string();
        let entries = blocks
            .iter()
            .map(|block| parse_entry(&block.join("\n")))
            .collect();

        Self {
            preamble: (!preamble.is_empty()).then_some(preamble),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    /// Render every entry separated by a blank line, ending with a newline.
    pub fn render(&self) -> String {
        let mut blocks: Vec<String> = Vec::with_capacity(self.entries.len() + 1);
        if let Some(preamble) = &self.preamble {
            blocks.push(preamble.clone());
        }
        blocks.extend(self.entries.iter().map(Entry::render));

        let mut output = blocks.join("\n\n");
        output.push('\n');
        output
    }
}

impl fmt::Display for Bibliography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
