/// Number of spaces before the field name
pub const INDENT_PRE: usize = 4;
/// Width of the field-name column; the `=` follows it after one space
pub const INDENT_POST: usize = 16;

/// Strip trailing separators so every rendered value ends with exactly one comma.
pub fn trim_value(value: &str) -> &str {
    value.trim().trim_end_matches(',').trim_end()
}

/// Render a field as an aligned, comma-terminated line.
///
/// ```
/// use bibfill::bibtex::format_field;
///
/// assert_eq!(format_field("doi", "{10.1/xyz}"), "    doi              = {10.1/xyz},");
/// ```
///
/// Continuation lines of a multi-line value are re-indented to the value column.
pub fn format_field(name: &str, value: &str) -> String {
    let value = trim_value(value);
    let mut lines = value.lines();
    let first = lines.next().unwrap_or("").trim();

    let mut output = format!(
        "{:pre$}{:<post$} = {}",
        "",
        name,
        first,
        pre = INDENT_PRE,
        post = INDENT_POST
    );

    let value_column = INDENT_PRE + INDENT_POST.max(name.len()) + 3;
    for line in lines {
        output.push('\n');
        let line = line.trim();
        if !line.is_empty() {
            output.push_str(&" ".repeat(value_column));
            output.push_str(line);
        }
    }

    output.push(',');
    output
}
