//! Command line entry point

use crate::config::Config;
use crate::controller::SessionController;
use crate::picker::PickerOutcome;
use crate::resolve::{EditorJump, Jump, PrintLocation, TemporaryFileRegistry};
use crate::tui::TuiPicker;
use anyhow::{Context, Result};
use clap::Parser;
use log::debug;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

/// agpick - interactive ag search that jumps to the chosen match
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Initial query text. Flags for the tool go after ` -- `.
    pub query: Option<String>,

    /// Directory or file to search (defaults to the enclosing git repository)
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Search tool to run instead of `ag`
    #[arg(long)]
    pub tool: Option<String>,

    /// Cut match text to this many characters
    #[arg(long)]
    pub max_columns: Option<usize>,

    /// Start with results grouped by file
    #[arg(long)]
    pub group: bool,

    /// Open the selection in $VISUAL/$EDITOR instead of printing it
    #[arg(long)]
    pub edit: bool,

    /// Hide the preview pane
    #[arg(long)]
    pub no_preview: bool,

    /// Write logs to this file (the terminal belongs to the picker)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Apply command line overrides on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(tool) = &self.tool {
            config.tool = tool.clone();
        }
        if let Some(max_columns) = self.max_columns {
            config.max_columns = max_columns;
        }
        if self.group {
            config.group = true;
        }
    }
}

/// Install the file logger. Without a log file nothing is logged.
pub fn init_logging(log_file: Option<&Path>, verbose: bool) -> Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = File::create(path)
        .with_context(|| format!("Cannot create log file {}", path.display()))?;
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init()
        .context("Logger already initialised")?;
    Ok(())
}

/// Parse arguments and run one interactive session.
pub async fn run_cli() -> Result<PickerOutcome> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref(), cli.verbose)?;

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    debug!("Configuration: {:?}", config);

    let cwd = env::current_dir().context("Cannot determine the working directory")?;
    let mut picker = TuiPicker::new(config.debounce(), !cli.no_preview);
    let mut opener = TemporaryFileRegistry::default();
    let mut jump: Box<dyn Jump + Send> = if cli.edit {
        Box::new(EditorJump::from_env())
    } else {
        Box::new(PrintLocation::new(std::io::stdout()))
    };

    let mut controller = SessionController::new(config);
    controller
        .run(
            &mut picker,
            &mut opener,
            jump.as_mut(),
            cli.directory.as_deref(),
            &cwd,
            cli.query,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["agpick", "--tool", "rg", "--max-columns", "80", "--group", "foo"]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(cli.query.as_deref(), Some("foo"));
        assert_eq!(config.tool, "rg");
        assert_eq!(config.max_columns, 80);
        assert!(config.group);
    }

    #[test]
    fn test_cli_defaults_keep_config() {
        let cli = Cli::parse_from(["agpick"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config, Config::default());
        assert!(cli.query.is_none());
        assert!(!cli.edit);
    }

    #[test]
    fn test_cli_target_directory() {
        let cli = Cli::parse_from(["agpick", "-d", "src", "--edit", "needle -- -i"]);
        assert_eq!(cli.directory, Some(PathBuf::from("src")));
        assert!(cli.edit);
        assert_eq!(cli.query.as_deref(), Some("needle -- -i"));
    }
}
