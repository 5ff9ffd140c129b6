//! Parser for `--vimgrep` output lines
//!
//! Each line has the shape `file:line:column:text`, where `file` has no colon
//! and `line`/`column` are 1-based decimal numbers. Anything else is noise from
//! the tool and yields no record.

use std::sync::Arc;

/// One parsed match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub path: Arc<str>,
    /// 1-based line number
    pub line: usize,
    /// 1-based column number, as reported by the tool
    pub column: usize,
    /// Matched line, cut to the configured width
    pub text: String,
}

/// Parses output lines of one search session.
///
/// The parser remembers the last path it produced so that consecutive matches
/// in the same file share one allocation.
#[derive(Debug, Clone)]
pub struct LineParser {
    max_columns: usize,
    last_path: Option<Arc<str>>,
}

impl LineParser {
    pub fn new(max_columns: usize) -> Self {
        Self {
            max_columns,
            last_path: None,
        }
    }

    pub fn max_columns(&self) -> usize {
        self.max_columns
    }

    /// Parse one line, returning `None` when it is not a match line.
    pub fn parse(&mut self, line: &str) -> Option<MatchRecord> {
        let mut parts = line.splitn(4, ':');
        let path = parts.next().filter(|p| !p.is_empty())?;
        let line_number = parse_number(parts.next()?)?;
        let column = parse_number(parts.next()?)?;
        let text = parts.next()?;

        Some(MatchRecord {
            path: self.intern(path),
            line: line_number,
            column,
            text: truncate(text, self.max_columns).to_string(),
        })
    }

    fn intern(&mut self, path: &str) -> Arc<str> {
        match &self.last_path {
            Some(last) if &**last == path => Arc::clone(last),
            _ => {
                let path: Arc<str> = Arc::from(path);
                self.last_path = Some(Arc::clone(&path));
                path
            }
        }
    }
}

fn parse_number(field: &str) -> Option<usize> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// The first `max` characters of `text`.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
