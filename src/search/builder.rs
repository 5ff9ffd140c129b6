//! Turns query text into the command line of the search tool
//!
//! Query text has up to two parts: a pattern and raw tool flags, separated by
//! a standalone `--` (`foo bar -- -i --python`). A query starting with a
//! delimiter character such as `#` uses it to delimit the pattern instead
//! (`#foo bar#rest`); whatever follows the closing delimiter, other than
//! flags, is a local filter the picker applies to received candidates.

use crate::config::Config;
use crate::search::regexp::{join_terms, DefaultRegexCompiler, Dialect, Highlighter, RegexCompiler};
use std::path::PathBuf;
use std::sync::Arc;

/// Separator between the pattern and extra tool flags.
pub const FLAG_SEPARATOR: &str = "--";

/// Query text split into the parts the builder cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParts<'a> {
    pub pattern: &'a str,
    pub flags: Vec<&'a str>,
    /// Text after the closing delimiter, never passed to the tool
    pub filter: &'a str,
}

impl QueryParts<'_> {
    /// Whether `other` would run the same search, ignoring the local filter.
    pub fn same_search(&self, other: &QueryParts<'_>) -> bool {
        self.pattern == other.pattern && self.flags == other.flags
    }
}

/// Characters that may open a delimited pattern. Regex metacharacters are
/// excluded so that `^foo` or `(a|b)` stay plain patterns.
pub const PATTERN_DELIMITERS: &[char] = &['#', '/', '!', '%', ',', ';', '@', '~', '='];

/// Split query text into pattern and extra flags.
pub fn split_query(input: &str) -> QueryParts<'_> {
    let input = input.trim_start();

    if let Some(delimiter) = input.chars().next().filter(|c| PATTERN_DELIMITERS.contains(c)) {
        let body = &input[delimiter.len_utf8()..];
        let (pattern, rest) = match body.find(delimiter) {
            Some(end) => (&body[..end], &body[end + delimiter.len_utf8()..]),
            None => (body, ""),
        };
        let (filter, flags) = split_flags(rest);
        return QueryParts {
            pattern: pattern.trim(),
            flags,
            filter: filter.trim(),
        };
    }

    let (pattern, flags) = split_flags(input);
    QueryParts {
        pattern: pattern.trim(),
        flags,
        filter: "",
    }
}

/// Split `text` at the first standalone separator token.
fn split_flags(text: &str) -> (&str, Vec<&str>) {
    let mut offset = 0;
    for token in text.split_whitespace() {
        // Tokens come back in order, so searching forward from the last one
        // finds this token's own position.
        let start = text[offset..].find(token).map_or(offset, |i| i + offset);
        offset = start + token.len();
        if token == FLAG_SEPARATOR {
            return (&text[..start], text[offset..].split_whitespace().collect());
        }
    }
    (text, Vec::new())
}

/// Command line for one query revision.
#[derive(Debug, Clone)]
pub struct SearchCommand {
    /// Program followed by its arguments
    pub argv: Vec<String>,
    /// Marks query matches inside match text, absent for an empty or broken pattern
    pub highlighter: Option<Highlighter>,
    /// Why the pattern was replaced by one that matches nothing
    pub rejected: Option<String>,
}

/// Builds [`SearchCommand`]s for a fixed set of search paths.
#[derive(Clone)]
pub struct CommandBuilder {
    prefix: Vec<String>,
    tool: String,
    tool_args: Vec<String>,
    dialect: Dialect,
    min_input: usize,
    paths: Vec<PathBuf>,
    compiler: Arc<dyn RegexCompiler>,
}

impl CommandBuilder {
    pub fn new(tool: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            prefix: Vec::new(),
            tool: tool.into(),
            tool_args: Vec::new(),
            dialect: Dialect::Extended,
            min_input: 0,
            paths,
            compiler: Arc::new(DefaultRegexCompiler),
        }
    }

    /// Builder configured from `config`, searching `paths`.
    pub fn from_config(config: &Config, paths: Vec<PathBuf>) -> Self {
        let mut builder = Self::new(config.tool.clone(), paths)
            .with_tool_args(config.tool_args.clone())
            .with_dialect(config.dialect)
            .with_min_input(config.min_input);
        if config.line_buffered {
            builder = builder.with_prefix(vec!["stdbuf".to_string(), "-oL".to_string()]);
        }
        builder
    }

    /// Words placed before the tool, e.g. `stdbuf -oL`.
    pub fn with_prefix(mut self, prefix: Vec<String>) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn with_tool_args(mut self, args: Vec<String>) -> Self {
        self.tool_args = args;
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_min_input(mut self, min_input: usize) -> Self {
        self.min_input = min_input;
        self
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn RegexCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// The search tool binary.
    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Whether `query` has enough pattern text to be worth a search.
    pub fn is_searchable(&self, query: &str) -> bool {
        let pattern = split_query(query).pattern;
        !pattern.is_empty() && pattern.chars().count() >= self.min_input
    }

    /// Build the command line for `query`.
    ///
    /// A pattern that does not compile is replaced with one that matches
    /// nothing, so the result is always a runnable command.
    pub fn build(&self, query: &str) -> SearchCommand {
        let parts = split_query(query);

        let mut rejected = None;
        let (pattern, highlighter) = match self.compiler.compile(parts.pattern, self.dialect) {
            Ok(compiled) => match join_terms(&compiled.terms, self.dialect) {
                Some(pattern) => (pattern, compiled.highlighter),
                None => (self.dialect.unsatisfiable().to_string(), None),
            },
            Err(e) => {
                log::info!("Pattern rejected, searching for nothing: {}", e);
                rejected = Some(e.to_string());
                (self.dialect.unsatisfiable().to_string(), None)
            }
        };

        let mut argv = Vec::with_capacity(
            self.prefix.len() + 1 + self.tool_args.len() + parts.flags.len() + 2 + self.paths.len(),
        );
        argv.extend(self.prefix.iter().cloned());
        argv.push(self.tool.clone());
        argv.extend(self.tool_args.iter().cloned());
        argv.extend(parts.flags.iter().map(|flag| flag.to_string()));
        if pattern.starts_with('-') {
            argv.push(FLAG_SEPARATOR.to_string());
        }
        argv.push(pattern);
        argv.extend(self.paths.iter().map(|path| path.to_string_lossy().into_owned()));

        SearchCommand {
            argv,
            highlighter,
            rejected,
        }
    }
}

impl std::fmt::Debug for CommandBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuilder")
            .field("prefix", &self.prefix)
            .field("tool", &self.tool)
            .field("tool_args", &self.tool_args)
            .field("dialect", &self.dialect)
            .field("min_input", &self.min_input)
            .field("paths", &self.paths)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ag(paths: &[&str]) -> CommandBuilder {
        CommandBuilder::from_config(
            &Config::default(),
            paths.iter().map(PathBuf::from).collect(),
        )
    }

    #[test]
    fn test_split_plain_query() {
        let parts = split_query("foo bar");
        assert_eq!(parts.pattern, "foo bar");
        assert!(parts.flags.is_empty());
    }

    #[test]
    fn test_split_query_with_flags() {
        let parts = split_query("foo bar -- -i --python");
        assert_eq!(parts.pattern, "foo bar");
        assert_eq!(parts.flags, vec!["-i", "--python"]);
    }

    #[test]
    fn test_split_separator_must_stand_alone() {
        let parts = split_query("foo--bar");
        assert_eq!(parts.pattern, "foo--bar");
        assert!(parts.flags.is_empty());
    }

    #[test]
    fn test_split_delimited_query() {
        let parts = split_query("#foo bar#local filter");
        assert_eq!(parts.pattern, "foo bar");
        assert!(parts.flags.is_empty());
        assert_eq!(parts.filter, "local filter");

        let parts = split_query("#unterminated");
        assert_eq!(parts.pattern, "unterminated");
        assert_eq!(parts.filter, "");
    }

    #[test]
    fn test_split_delimited_query_with_flags() {
        let parts = split_query("#foo#filter -- -w");
        assert_eq!(parts.pattern, "foo");
        assert_eq!(parts.flags, vec!["-w"]);
        assert_eq!(parts.filter, "filter");
    }

    #[test]
    fn test_filter_only_edit_is_same_search() {
        let before = split_query("#foo#ma -- -w");
        let after = split_query("#foo#main -- -w");
        assert!(before.same_search(&after));
        assert!(!before.same_search(&split_query("#foo#main")));
        assert!(!before.same_search(&split_query("#fo#ma -- -w")));
    }

    #[test]
    fn test_split_keeps_regex_anchors() {
        assert_eq!(split_query("^fn main").pattern, "^fn main");
        assert_eq!(split_query("(a|b)").pattern, "(a|b)");
    }

    #[test]
    fn test_build_default_command() {
        let command = ag(&["."]).build("hello");
        assert_eq!(
            command.argv,
            vec!["stdbuf", "-oL", "ag", "--vimgrep", "hello", "."]
        );
        assert!(command.highlighter.is_some());
    }

    #[test]
    fn test_build_places_flags_before_pattern() {
        let command = ag(&["src", "tests"]).build("foo bar -- -i");
        assert_eq!(
            command.argv,
            vec![
                "stdbuf",
                "-oL",
                "ag",
                "--vimgrep",
                "-i",
                "(foo).*(bar)|(bar).*(foo)",
                "src",
                "tests"
            ]
        );
    }

    #[test]
    fn test_build_without_line_buffering() {
        let config = Config {
            line_buffered: false,
            ..Config::default()
        };
        let command = CommandBuilder::from_config(&config, vec![PathBuf::from(".")]).build("x");
        assert_eq!(command.argv, vec!["ag", "--vimgrep", "x", "."]);
    }

    #[test]
    fn test_compile_failure_yields_unsatisfiable_pattern() {
        let command = ag(&["."]).build("foo(");
        assert_eq!(command.argv, vec!["stdbuf", "-oL", "ag", "--vimgrep", "$.^", "."]);
        assert!(command.highlighter.is_none());
        let reason = command.rejected.unwrap();
        assert!(reason.contains("foo("), "reason {:?}", reason);

        let command = ag(&["."]).build("foo");
        assert!(command.rejected.is_none());
    }

    #[test]
    fn test_pcre_dialect_override() {
        let config = Config {
            dialect: Dialect::Pcre,
            ..Config::default()
        };
        let builder = CommandBuilder::from_config(&config, vec![PathBuf::from(".")]);
        let argv = builder.build("foo|bar baz").argv;
        assert_eq!(argv[argv.len() - 2], "^(?=.*(?:foo|bar))(?=.*(?:baz))");
        assert_eq!(builder.build("(").argv[4], "(?!)");
    }

    #[test]
    fn test_leading_dash_pattern_is_separated() {
        let command = ag(&["."]).build("-foo");
        assert_eq!(command.argv[command.argv.len() - 3..], ["--", "-foo", "."]);
    }

    #[test]
    fn test_paths_are_always_a_suffix() {
        let paths = ["a", "b/c", "d e"];
        let builder = ag(&paths);
        for query in ["", "x", "foo bar", "foo(", "q -- -i -w", "#p#f", "--", "-- -i"] {
            let argv = builder.build(query).argv;
            assert_eq!(&argv[argv.len() - paths.len()..], &paths, "query {:?}", query);
        }
    }

    #[test]
    fn test_is_searchable_respects_min_input() {
        let builder = ag(&["."]);
        assert!(!builder.is_searchable(""));
        assert!(!builder.is_searchable("ab"));
        assert!(!builder.is_searchable("ab -- -i"));
        assert!(builder.is_searchable("abc"));
    }
}
