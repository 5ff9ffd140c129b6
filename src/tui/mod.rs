//! Terminal front end
//!
//! A ratatui/crossterm implementation of [`crate::picker::Picker`].

pub mod input;
pub mod list;
pub mod picker;
pub mod renderer;
pub mod search_debouncer;
pub mod toast;

pub use input::{InputOperation, QueryInput};
pub use list::{ResultList, SearchStatus};
pub use picker::TuiPicker;
pub use search_debouncer::SearchDebouncer;
pub use toast::{ToastState, ToastType};
