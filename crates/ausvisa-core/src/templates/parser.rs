//! Parser for sectioned Cypher template files
//!
//! A template file looks like:
//!
//! ```text
//! // 2.1. VISA INFO
//! // Use case: "What is visa 500?"
//! MATCH (v:Visa {subclass: $subclass})
//! RETURN v.name_visa AS visa_name
//! ```
//!
//! Each `// <major>.<minor>. <NAME>` header opens a section. The query body
//! starts at the first line beginning with a Cypher clause keyword and stops
//! at the next blank or comment line.

/// Clause keywords that may open a query body
pub const QUERY_KEYWORDS: [&str; 9] = [
    "MATCH", "OPTIONAL", "WITH", "RETURN", "WHERE", "CREATE", "MERGE", "UNWIND", "CALL",
];

/// Bodies this short are treated as noise
const MIN_BODY_LEN: usize = 10;

/// One section found in a template source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSection {
    /// Header text as written, e.g. `VISA INFO`
    pub header: String,
    /// Canonical identifier, e.g. `visa_info`
    pub name: String,
    /// Query text, or `None` if the section had no usable body
    pub body: Option<String>,
}

/// Split a template source into sections
pub fn parse_sections(source: &str) -> Vec<ParsedSection> {
    let mut sections = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in source.lines() {
        if let Some(header) = section_header(line) {
            if let Some((header, lines)) = current.take() {
                sections.push(finish_section(header, &lines));
            }
            current = Some((header.to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }

    if let Some((header, lines)) = current.take() {
        sections.push(finish_section(header, &lines));
    }

    sections
}

/// Canonical identifier for a header
///
/// Lower-cases and collapses every run of whitespace or punctuation into a
/// single underscore: `"Find Programs - by IELTS"` becomes
/// `"find_programs_by_ielts"`.
pub fn normalize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for c in raw.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    out
}

/// Header text if `line` is a `// N.M. NAME` section marker
fn section_header(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("//")?.trim_start();
    let rest = strip_number(rest)?.strip_prefix('.')?;
    let rest = strip_number(rest)?.strip_prefix('.')?;
    let header = rest.trim();
    if header.is_empty() { None } else { Some(header) }
}

fn strip_number(s: &str) -> Option<&str> {
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 { None } else { Some(&s[digits..]) }
}

fn starts_with_keyword(line: &str) -> bool {
    QUERY_KEYWORDS.iter().any(|keyword| {
        line.strip_prefix(keyword).is_some_and(|rest| {
            rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == '(')
        })
    })
}

fn finish_section(header: String, lines: &[&str]) -> ParsedSection {
    let mut body_lines = Vec::new();
    let mut in_query = false;

    for line in lines {
        let stripped = line.trim();
        if !in_query {
            if starts_with_keyword(stripped) {
                in_query = true;
            } else {
                continue;
            }
        }
        if stripped.is_empty() || stripped.starts_with("//") {
            break;
        }
        body_lines.push(line.trim_end());
    }

    let body = dedent(&body_lines);
    ParsedSection {
        name: normalize_identifier(&header),
        header,
        body: (body.len() > MIN_BODY_LEN).then_some(body),
    }
}

/// Strip the indentation shared by every line
fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| &l[indent.min(l.len())..])
        .collect::<Vec<_>>()
        .join("\n")
}
