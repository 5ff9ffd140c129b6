//! Search debounce control
//!
//! Holds back query revisions while the user is typing. A revision is only
//! issued once no key has been pressed for the debounce delay.

use std::time::Duration;
use tokio::time::Instant;

/// Debounce controller for query revisions
#[derive(Debug)]
pub struct SearchDebouncer {
    /// Quiet period before a pending query is released
    pub debounce_delay: Duration,

    /// Query waiting for the quiet period to pass
    pub pending_query: Option<String>,

    /// Time of the last edit
    pub last_input_time: Option<Instant>,
}

impl SearchDebouncer {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            debounce_delay: delay,
            pending_query: None,
            last_input_time: None,
        }
    }

    /// Record an edit producing `query`.
    pub fn set_pending(&mut self, query: String) {
        self.pending_query = Some(query);
        self.last_input_time = Some(Instant::now());
    }

    pub fn clear(&mut self) {
        self.pending_query = None;
        self.last_input_time = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending_query.is_some()
    }

    /// When the pending query becomes ready, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_input_time.map(|t| t + self.debounce_delay)
    }

    /// Take the pending query once the quiet period has passed.
    pub fn take_ready(&mut self) -> Option<String> {
        let deadline = self.deadline()?;
        if Instant::now() < deadline {
            return None;
        }
        self.last_input_time = None;
        self.pending_query.take()
    }

    /// Take the pending query regardless of the delay.
    pub fn flush(&mut self) -> Option<String> {
        self.last_input_time = None;
        self.pending_query.take()
    }
}

impl Default for SearchDebouncer {
    fn default() -> Self {
        Self::with_delay(Duration::from_millis(100))
    }
}
