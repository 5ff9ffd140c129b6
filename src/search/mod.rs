//! Pure transformations between query text, tool command lines and results
//!
//! Nothing here does I/O: [`builder`] turns a query into argv, [`parser`]
//! turns a tool output line into a [`MatchRecord`], and [`candidate`] turns
//! that into a [`Candidate`] for display.

pub mod builder;
pub mod candidate;
pub mod parser;
pub mod regexp;

pub use builder::{split_query, CommandBuilder, QueryParts, SearchCommand};
pub use candidate::{group_key, Candidate, CandidateFormatter, Location, Style, StyledSpan};
pub use parser::{LineParser, MatchRecord};
pub use regexp::{DefaultRegexCompiler, Dialect, Highlighter, PatternError, RegexCompiler};
