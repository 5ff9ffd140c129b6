//! Regex compilation for the search tool and for match highlighting
//!
//! The user types patterns in Rust regex syntax. The [`RegexCompiler`] turns
//! that input into one expression per whitespace separated term, translated
//! for the tool's [`Dialect`] (extended regular expressions unless configured
//! otherwise), plus a [`Highlighter`] that finds the same terms inside match
//! text.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::ops::Range;
use std::sync::Arc;

/// Above this many terms the extended dialect stops enumerating orderings.
const MAX_PERMUTED_TERMS: usize = 3;

/// Regex flavor understood by the search tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Perl compatible, for tools run in `--pcre2` style modes
    Pcre,
    /// POSIX extended regular expressions
    #[default]
    Extended,
}

impl Dialect {
    /// A valid expression in this dialect that can never match a line.
    pub fn unsatisfiable(self) -> &'static str {
        match self {
            Dialect::Pcre => "(?!)",
            Dialect::Extended => "$.^",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid pattern {term:?}: {source}")]
    Invalid {
        term: String,
        #[source]
        source: regex::Error,
    },
}

/// Terms of one query, ready to be joined for the tool.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    /// Translated terms, in input order
    pub terms: Vec<String>,
    pub highlighter: Option<Highlighter>,
}

/// Compiles user input into tool regexps plus a highlighter.
pub trait RegexCompiler: Send + Sync {
    fn compile(&self, input: &str, dialect: Dialect) -> Result<CompiledPattern, PatternError>;
}

/// Splits input on whitespace, validates each term with the `regex` crate and
/// applies smart case to highlighting (case-insensitive unless the term has an
/// uppercase letter, like `ag` does).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRegexCompiler;

impl RegexCompiler for DefaultRegexCompiler {
    fn compile(&self, input: &str, dialect: Dialect) -> Result<CompiledPattern, PatternError> {
        let mut terms = Vec::new();
        let mut regexes = Vec::new();

        for term in input.split_whitespace() {
            let regex = RegexBuilder::new(term)
                .case_insensitive(!term.chars().any(char::is_uppercase))
                .build()
                .map_err(|source| PatternError::Invalid {
                    term: term.to_string(),
                    source,
                })?;
            regexes.push(regex);
            terms.push(translate(term, dialect));
        }

        let highlighter = (!regexes.is_empty()).then(|| Highlighter::new(regexes));
        Ok(CompiledPattern { terms, highlighter })
    }
}

/// Rewrite a term written in Rust/PCRE syntax for `dialect`.
pub fn translate(term: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Pcre => term.to_string(),
        Dialect::Extended => {
            let mut out = String::with_capacity(term.len());
            let mut chars = term.chars();
            while let Some(c) = chars.next() {
                if c != '\\' {
                    out.push(c);
                    continue;
                }
                match chars.next() {
                    Some('d') => out.push_str("[[:digit:]]"),
                    Some('D') => out.push_str("[^[:digit:]]"),
                    Some('w') => out.push_str("[[:alnum:]_]"),
                    Some('W') => out.push_str("[^[:alnum:]_]"),
                    Some('s') => out.push_str("[[:space:]]"),
                    Some('S') => out.push_str("[^[:space:]]"),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => out.push('\\'),
                }
            }
            out
        }
    }
}

/// Join terms into one expression that requires all of them.
///
/// Every term is grouped, so an alternation inside a term stays in its slot.
/// Returns `None` for an empty term list.
pub fn join_terms(terms: &[String], dialect: Dialect) -> Option<String> {
    match terms {
        [] => None,
        [single] => Some(single.clone()),
        _ => Some(match dialect {
            Dialect::Pcre => {
                let lookaheads: String =
                    terms.iter().map(|t| format!("(?=.*(?:{}))", t)).collect();
                format!("^{}", lookaheads)
            }
            Dialect::Extended => {
                let groups: Vec<String> = terms.iter().map(|t| format!("({})", t)).collect();
                if groups.len() <= MAX_PERMUTED_TERMS {
                    permutations(&groups)
                        .into_iter()
                        .map(|order| order.join(".*"))
                        .collect::<Vec<_>>()
                        .join("|")
                } else {
                    groups.join(".*")
                }
            }
        }),
    }
}

fn permutations(terms: &[String]) -> Vec<Vec<&str>> {
    let mut out = Vec::new();
    let mut order: Vec<&str> = terms.iter().map(String::as_str).collect();
    permute(&mut order, 0, &mut out);
    out
}

fn permute<'a>(order: &mut Vec<&'a str>, start: usize, out: &mut Vec<Vec<&'a str>>) {
    if start + 1 >= order.len() {
        out.push(order.clone());
        return;
    }
    for i in start..order.len() {
        order.swap(start, i);
        permute(order, start + 1, out);
        order.swap(start, i);
    }
}

/// Finds the byte ranges of query terms inside match text.
#[derive(Debug, Clone)]
pub struct Highlighter {
    regexes: Arc<Vec<Regex>>,
}

impl Highlighter {
    pub fn new(regexes: Vec<Regex>) -> Self {
        Self {
            regexes: Arc::new(regexes),
        }
    }

    /// Sorted, non-overlapping byte ranges of every term match in `text`.
    pub fn highlight(&self, text: &str) -> Vec<Range<usize>> {
        let mut ranges: Vec<Range<usize>> = self
            .regexes
            .iter()
            .flat_map(|regex| regex.find_iter(text).map(|m| m.range()))
            .filter(|range| !range.is_empty())
            .collect();
        ranges.sort_by_key(|range| (range.start, range.end));

        let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(terms: &[&str]) -> Vec<String> {
        terms.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_compile_splits_terms() {
        let compiled = DefaultRegexCompiler.compile("foo  ba?r", Dialect::Pcre).unwrap();
        assert_eq!(compiled.terms, vec!["foo", "ba?r"]);
        assert!(compiled.highlighter.is_some());
    }

    #[test]
    fn test_compile_empty_input_has_no_terms() {
        let compiled = DefaultRegexCompiler.compile("   ", Dialect::Pcre).unwrap();
        assert!(compiled.terms.is_empty());
        assert!(compiled.highlighter.is_none());
    }

    #[test]
    fn test_compile_rejects_invalid_term() {
        let err = DefaultRegexCompiler.compile("ok (unclosed", Dialect::Pcre).unwrap_err();
        match err {
            PatternError::Invalid { term, .. } => assert_eq!(term, "(unclosed"),
        }
    }

    #[test]
    fn test_translate_extended_classes() {
        assert_eq!(translate(r"\d+\.\w", Dialect::Extended), r"[[:digit:]]+\.[[:alnum:]_]");
        assert_eq!(translate(r"\d+", Dialect::Pcre), r"\d+");
    }

    #[test]
    fn test_join_single_term_is_unchanged() {
        assert_eq!(join_terms(&strings(&["foo"]), Dialect::Pcre).unwrap(), "foo");
        assert!(join_terms(&[], Dialect::Pcre).is_none());
    }

    #[test]
    fn test_join_pcre_uses_lookaheads() {
        assert_eq!(
            join_terms(&strings(&["foo", "bar"]), Dialect::Pcre).unwrap(),
            "^(?=.*(?:foo))(?=.*(?:bar))"
        );
    }

    #[test]
    fn test_join_extended_enumerates_orders() {
        assert_eq!(
            join_terms(&strings(&["a", "b"]), Dialect::Extended).unwrap(),
            "(a).*(b)|(b).*(a)"
        );
        let joined = join_terms(&strings(&["a", "b", "c"]), Dialect::Extended).unwrap();
        assert_eq!(joined.split('|').count(), 6);
        assert_eq!(
            join_terms(&strings(&["a", "b", "c", "d"]), Dialect::Extended).unwrap(),
            "(a).*(b).*(c).*(d)"
        );
    }

    #[test]
    fn test_join_keeps_alternation_inside_its_term() {
        let compiled = DefaultRegexCompiler.compile("foo|bar baz", Dialect::Extended).unwrap();
        let joined = join_terms(&compiled.terms, Dialect::Extended).unwrap();
        assert_eq!(joined, "(foo|bar).*(baz)|(baz).*(foo|bar)");

        // The joined expression is also valid Rust regex syntax.
        let regex = Regex::new(&joined).unwrap();
        assert!(!regex.is_match("only foo here"));
        assert!(!regex.is_match("only baz here"));
        assert!(regex.is_match("xx bar baz"));
        assert!(regex.is_match("baz then foo"));

        let compiled = DefaultRegexCompiler.compile("foo|bar baz", Dialect::Pcre).unwrap();
        assert_eq!(
            join_terms(&compiled.terms, Dialect::Pcre).unwrap(),
            "^(?=.*(?:foo|bar))(?=.*(?:baz))"
        );
    }

    #[test]
    fn test_default_dialect_is_extended() {
        assert_eq!(Dialect::default(), Dialect::Extended);
    }

    #[test]
    fn test_highlight_smart_case_and_merge() {
        let compiled = DefaultRegexCompiler.compile("hello lo", Dialect::Pcre).unwrap();
        let highlighter = compiled.highlighter.unwrap();
        // "hello" matches case-insensitively and overlaps "lo".
        assert_eq!(highlighter.highlight("say HELLO world"), vec![4..9]);

        let compiled = DefaultRegexCompiler.compile("World", Dialect::Pcre).unwrap();
        let highlighter = compiled.highlighter.unwrap();
        assert!(highlighter.highlight("world").is_empty());
        assert_eq!(highlighter.highlight("World world"), vec![0..5]);
    }
}
