//! Message envelope shared by every channel in the actor system.

/// A message in the actor system.
///
/// `method` names what happened (`"updateQuery"`, `"pushCandidates"`, ...) and
/// `payload` carries the typed data for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<T> {
    /// The method name for this message
    pub method: String,
    /// The message payload
    pub payload: T,
}

impl<T> Message<T> {
    /// Create a new Message with the specified method and payload.
    pub fn new(method: impl Into<String>, payload: T) -> Self {
        Self {
            method: method.into(),
            payload,
        }
    }
}
