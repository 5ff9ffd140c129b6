pub mod actors;
pub mod cli;
pub mod config;
pub mod controller;
pub mod core;
pub mod picker;
pub mod resolve;
pub mod search;
pub mod tui;

// 公開API
pub use config::Config;
pub use controller::{SearchRoot, SessionController};
pub use picker::{Picker, PickerOutcome, PickerRequest};
pub use resolve::{resolve, FileOpener, Jump, Position, TemporaryFileRegistry};
pub use search::{Candidate, CommandBuilder, LineParser};
