//! Runtime configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all) is a
//! valid configuration. Command line flags are applied on top in `cli.rs`.

use crate::core::StreamOptions;
use crate::search::regexp::Dialect;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Exit codes of the search tool that end a session normally.
///
/// `ag` and `rg` exit with 1 when nothing matched.
pub const ACCEPTED_EXIT_CODES: [i32; 2] = [0, 1];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search tool binary, must understand `--vimgrep`
    pub tool: String,
    /// Flags putting the tool in machine-parsable match mode
    pub tool_args: Vec<String>,
    /// Wrap the tool in `stdbuf -oL`
    pub line_buffered: bool,
    /// Regex dialect the tool expects
    pub dialect: Dialect,
    /// Match text is cut to this many characters
    pub max_columns: usize,
    /// Shorter patterns do not start a search
    pub min_input: usize,
    pub debounce_ms: u64,
    pub batch_size: usize,
    pub flush_ms: u64,
    /// Outbound channel capacity, in batches
    pub channel_capacity: usize,
    /// Start the picker with grouped display
    pub group: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tool: "ag".to_string(),
            tool_args: vec!["--vimgrep".to_string()],
            line_buffered: true,
            dialect: Dialect::Extended,
            max_columns: 300,
            min_input: 3,
            debounce_ms: 100,
            batch_size: 64,
            flush_ms: 30,
            channel_capacity: 32,
            group: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            batch_size: self.batch_size.max(1),
            flush_interval: Duration::from_millis(self.flush_ms),
            accepted_exit_codes: ACCEPTED_EXIT_CODES.to_vec(),
        }
    }
}
