use crate::bibtex::entry::{Entry, Field, UNKNOWN_FIELD};
use crate::bibtex::FIELD_REGEX;

/// Parse the text of one entry, from its `@type{` line up to the next entry.
///
/// Never fails. Lines that do not look like `name = value` are folded into the
/// previous field, or kept under an `unknown` field when nothing precedes them,
/// so every piece of input text survives into the rendered output.
pub fn parse_entry(text: &str) -> Entry {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or("").trim();
    let (header, rest) = split_header(first);

    let mut collector = FieldCollector::default();
    if let Some(rest) = rest {
        collector.feed(rest);
    }
    for line in lines {
        collector.feed(line);
    }
    collector.finish(header)
}

/// Split `@type{key, ...` after the key's comma, or after the key itself when
/// the comma is missing. Whatever follows is field content.
fn split_header(line: &str) -> (&str, Option<&str>) {
    let Some(brace) = line.find('{') else {
        return (line, None);
    };
    let end = match line[brace..].find(',') {
        Some(idx) => brace + idx + 1,
        None => {
            let after = &line[brace + 1..];
            let key_start = brace + 1 + (after.len() - after.trim_start().len());
            match line[key_start..].find(char::is_whitespace) {
                Some(idx) => key_start + idx,
                None => return (line, None),
            }
        }
    };
    let rest = &line[end..];
    (&line[..end], (!rest.trim().is_empty()).then_some(rest))
}

/// Brace and quote nesting carried from one line to the next.
#[derive(Debug, Default)]
struct Scanner {
    depth: usize,
    in_quote: bool,
}

impl Scanner {
    fn inside_value(&self) -> bool {
        self.depth > 0 || self.in_quote
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Closing(&'a str),
}

/// Split a line at top-level commas (each piece keeps its comma). A top-level `}`
/// ends the entry and takes the rest of the line with it.
fn split_line<'a>(line: &'a str, scanner: &mut Scanner) -> Vec<Segment<'a>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (idx, c) in line.char_indices() {
        match c {
            '{' => scanner.depth += 1,
            '}' if scanner.depth > 0 => scanner.depth -= 1,
            '}' if !scanner.in_quote => {
                segments.push(Segment::Text(&line[start..idx]));
                segments.push(Segment::Closing(&line[idx..]));
                return segments;
            }
            '"' if scanner.depth == 0 && !escaped => scanner.in_quote = !scanner.in_quote,
            ',' if !scanner.inside_value() => {
                segments.push(Segment::Text(&line[start..=idx]));
                start = idx + 1;
            }
            _ => {}
        }
        escaped = c == '\\';
    }

    segments.push(Segment::Text(&line[start..]));
    segments
}

#[derive(Debug, Default)]
struct FieldCollector {
    scanner: Scanner,
    fields: Vec<Field>,
    closing: Option<String>,
    trailer: Vec<String>,
}

impl FieldCollector {
    fn feed(&mut self, line: &str) {
        if line.trim().is_empty() {
            // paragraph breaks inside an open value are part of it
            if self.closing.is_none() && self.scanner.inside_value() && !self.fields.is_empty() {
                self.append("", "\n");
            }
            return;
        }
        if self.closing.is_some() {
            self.trailer.push(line.trim_end().to_string());
            return;
        }

        let starts_inside = self.scanner.inside_value();
        for (position, segment) in split_line(line, &mut self.scanner).into_iter().enumerate() {
            match segment {
                Segment::Closing(text) => self.closing = Some(text.trim().to_string()),
                Segment::Text(text) => {
                    let text = text.trim();
                    if text.is_empty() || text == "," {
                        continue;
                    }
                    // pieces after the first on a line were comma-separated
                    let separator = if position == 0 { "\n" } else { " " };
                    if position == 0 && starts_inside {
                        self.append(text, separator);
                    } else if let Some(captures) = FIELD_REGEX.captures(text) {
                        self.fields.push(Field::new(&captures[1], &captures[2]));
                    } else {
                        self.append(text, separator);
                    }
                }
            }
        }
    }

    fn append(&mut self, text: &str, separator: &str) {
        match self.fields.last_mut() {
            Some(field) => {
                field.value.push_str(separator);
                field.value.push_str(text);
            }
            None => self.fields.push(Field::new(UNKNOWN_FIELD, text)),
        }
    }

    fn finish(self, header: &str) -> Entry {
        let trailer = (!self.trailer.is_empty()).then(|| self.trailer.join("\n"));
        Entry::from_parts(header.to_string(), self.fields, self.closing, trailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_line_keeps_commas_inside_braces() {
        let mut scanner = Scanner::default();
        let segments = split_line("author = {Smith, J.}, year = {2020}}", &mut scanner);
        assert_eq!(
            segments,
            vec![
                Segment::Text("author = {Smith, J.},"),
                Segment::Text(" year = {2020}"),
                Segment::Closing("}"),
            ]
        );
    }

    #[test]
    fn scanner_depth_survives_line_breaks() {
        let mut scanner = Scanner::default();
        split_line("title = {A Very Long Title", &mut scanner);
        assert!(scanner.inside_value());
        split_line("That Spans Lines},", &mut scanner);
        assert!(!scanner.inside_value());
    }

    #[test]
    fn split_header_without_key_comma() {
        assert_eq!(split_header("@misc{k2 title oops}"), ("@misc{k2", Some(" title oops}")));
        assert_eq!(split_header("@misc{k2}"), ("@misc{k2}", None));
        assert_eq!(split_header("@article{k1,"), ("@article{k1,", None));
        assert_eq!(
            split_header("@article{k1, year={2020}}"),
            ("@article{k1,", Some(" year={2020}}"))
        );
    }
}
