//! Actor implementations for agpick
//!
//! This module contains the concrete search actor that extends the core actor
//! system with `ag` specific functionality.

pub mod ag;
pub mod messages;

pub use ag::{AgHandler, SearchActor, SearchHandler};
pub use messages::{QueryRevision, SearchMessage};
