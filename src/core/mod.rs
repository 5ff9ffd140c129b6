//! Core actor machinery
//!
//! A small actor system: typed [`Message`]s, an [`Actor`] message loop, and a
//! [`CommandActor`] that streams the stdout of one external process at a time.

pub mod actor;
pub mod command;
pub mod message;

// Re-exports for convenience
pub use actor::{Actor, ActorController, ActorSendError, MessageHandler};
pub use command::{
    CommandActor, CommandError, CommandHandler, SessionState, StateView, StreamOptions,
};
pub use message::Message;
