//! agpick - pick an `ag` match interactively and jump to it
//!
//! Usage:
//!   agpick [query]              - search the enclosing repository
//!   agpick -d <dir|file> [query] - search a directory or a single file
//!   agpick 'foo bar -- -i'      - extra flags for the tool after ` -- `

use agpick::cli::run_cli;
use agpick::picker::PickerOutcome;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run_cli().await {
        Ok(PickerOutcome::Jumped { .. }) => ExitCode::SUCCESS,
        Ok(PickerOutcome::Cancelled { .. }) => ExitCode::from(130),
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("agpick: {:#}", e);
            ExitCode::from(2)
        }
    }
}
