//! Display-ready search results
//!
//! A [`Candidate`] keeps its [`Location`] next to the display string, so
//! selecting it never parses the text back (paths may contain anything).

use crate::search::parser::MatchRecord;
use crate::search::regexp::Highlighter;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Path,
    Location,
    Match,
}

/// Byte range of the display text rendered in one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub range: Range<usize>,
    pub style: Style,
}

/// Where a candidate points, with the tool's 1-based numbering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub path: Arc<str>,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    display: String,
    spans: Vec<StyledSpan>,
    /// Where the match text starts in `display`
    text_start: usize,
    location: Location,
}

impl Candidate {
    /// `file:line:column:text`
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Styled ranges, sorted and non-overlapping.
    pub fn spans(&self) -> &[StyledSpan] {
        &self.spans
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// The matched line text.
    pub fn text(&self) -> &str {
        &self.display[self.text_start..]
    }

    /// Display text without the path, `line:column:text`, for grouped views.
    pub fn ungrouped(&self) -> &str {
        &self.display[self.location.path.len() + 1..]
    }

    /// Spans of [`Candidate::ungrouped`], shifted to its coordinates.
    pub fn ungrouped_spans(&self) -> impl Iterator<Item = StyledSpan> + '_ {
        let offset = self.location.path.len() + 1;
        self.spans
            .iter()
            .filter(move |span| span.range.start >= offset)
            .map(move |span| StyledSpan {
                range: span.range.start - offset..span.range.end - offset,
                style: span.style,
            })
    }
}

/// Group key of a candidate: its file path.
pub fn group_key(candidate: &Candidate) -> &str {
    &candidate.location.path
}

/// Turns [`MatchRecord`]s into [`Candidate`]s.
#[derive(Debug, Clone, Default)]
pub struct CandidateFormatter {
    highlighter: Option<Highlighter>,
}

impl CandidateFormatter {
    pub fn new(highlighter: Option<Highlighter>) -> Self {
        Self { highlighter }
    }

    pub fn format(&self, record: MatchRecord) -> Candidate {
        let MatchRecord {
            path,
            line,
            column,
            text,
        } = record;

        let position = format!("{}:{}", line, column);
        let mut display = String::with_capacity(path.len() + position.len() + text.len() + 2);
        display.push_str(&path);
        display.push(':');
        display.push_str(&position);
        display.push(':');
        let text_start = display.len();
        display.push_str(&text);

        let mut spans = vec![
            StyledSpan {
                range: 0..path.len(),
                style: Style::Path,
            },
            StyledSpan {
                range: path.len() + 1..path.len() + 1 + position.len(),
                style: Style::Location,
            },
        ];
        if let Some(highlighter) = &self.highlighter {
            spans.extend(highlighter.highlight(&text).into_iter().map(|range| StyledSpan {
                range: range.start + text_start..range.end + text_start,
                style: Style::Match,
            }));
        }

        Candidate {
            display,
            spans,
            text_start,
            location: Location { path, line, column },
        }
    }
}
