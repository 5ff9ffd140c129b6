//! Contract between the session controller and an interactive picker
//!
//! A picker shows candidates as they stream in from a [`CandidateSource`],
//! lets the user revise the query, and reports preview/commit/cancel actions
//! to a [`PickerState`] which does the actual file work.

use crate::actors::{SearchActor, SearchMessage};
use crate::core::{ActorSendError, Message, SessionState};
use crate::resolve::{Position, ResolveError};
use crate::search::{Candidate, Location};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Entries kept per history key.
const HISTORY_LIMIT: usize = 100;

/// Incremental candidate stream keyed by query text.
///
/// Only messages of the most recent revision come out of [`CandidateSource::next`].
pub struct CandidateSource {
    actor: SearchActor,
    receiver: mpsc::Receiver<Message<SearchMessage>>,
    current: u64,
}

impl CandidateSource {
    pub fn new(actor: SearchActor, receiver: mpsc::Receiver<Message<SearchMessage>>) -> Self {
        Self {
            actor,
            receiver,
            current: 0,
        }
    }

    /// Start searching for `text`, superseding the running search.
    pub fn revise(&mut self, text: &str) -> Result<u64, ActorSendError> {
        self.current = self.actor.revise(text)?;
        Ok(self.current)
    }

    pub fn current_revision(&self) -> u64 {
        self.current
    }

    /// Next message of the current revision, or `None` once the actor is gone.
    ///
    /// Cancel safe: a message dropped by a cancelled call was stale anyway.
    pub async fn next(&mut self) -> Option<SearchMessage> {
        loop {
            let message = self.receiver.recv().await?;
            match message.payload.revision() {
                Some(revision) if revision == self.current => return Some(message.payload),
                revision => {
                    log::trace!(
                        "Dropping {} for stale revision {:?} (current {})",
                        message.method,
                        revision,
                        self.current
                    );
                }
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.actor.state().get()
    }

    /// Stop searching and shut the actor down.
    pub async fn close(&mut self) {
        self.actor.shutdown().await;
    }
}

/// Lines around a match, for the preview pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub path: PathBuf,
    /// 1-based line of the match
    pub line: usize,
    /// `(line number, text)` pairs
    pub lines: Vec<(usize, String)>,
}

impl Preview {
    /// Preview of `text` showing `context` lines on each side of `line`.
    pub fn from_text(path: PathBuf, text: &str, line: usize, context: usize) -> Self {
        let first = line.saturating_sub(context).max(1);
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .skip(first - 1)
            .take(line + context + 1 - first)
            .map(|(n, l)| (n, l.to_string()))
            .collect();
        Self { path, line, lines }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PickerAction<'a> {
    /// The cursor rests on a candidate
    Preview(&'a Candidate),
    /// The user is about to choose a candidate; its file must open
    Open(&'a Candidate),
    /// The user chose a candidate
    Commit(&'a Candidate),
    /// The user left without choosing
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateReply {
    None,
    Preview(Preview),
    Jumped(Position),
}

/// Receives the picker's state transitions.
pub trait PickerState: Send {
    fn on_action(&mut self, action: PickerAction<'_>) -> Result<StateReply, ResolveError>;
}

/// In-memory query history, one list per key, newest last.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: HashMap<String, Vec<String>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `query` under `key`, skipping blanks and repeats of the newest entry.
    pub fn record(&mut self, key: &str, query: &str) {
        if query.trim().is_empty() {
            return;
        }
        let entries = self.entries.entry(key.to_string()).or_default();
        if entries.last().map(String::as_str) == Some(query) {
            return;
        }
        entries.push(query.to_string());
        if entries.len() > HISTORY_LIMIT {
            entries.remove(0);
        }
    }

    pub fn entries(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entry `back` steps before the newest (0 is the newest).
    pub fn recall(&self, key: &str, back: usize) -> Option<&str> {
        let entries = self.entries(key);
        entries
            .len()
            .checked_sub(back + 1)
            .map(|i| entries[i].as_str())
    }
}

/// Everything a picker needs for one interactive session.
pub struct PickerRequest<'a> {
    pub prompt: String,
    pub source: &'a mut CandidateSource,
    /// Navigation metadata of a candidate
    pub lookup: fn(&Candidate) -> &Location,
    pub state: &'a mut dyn PickerState,
    pub group: fn(&Candidate) -> &str,
    /// Start in grouped display
    pub grouped: bool,
    /// Enter does nothing until a candidate is selected
    pub require_match: bool,
    pub initial: String,
    pub history_key: &'static str,
    pub history: &'a mut History,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerOutcome {
    Jumped { query: String, position: Position },
    Cancelled { query: String },
}

impl PickerOutcome {
    pub fn query(&self) -> &str {
        match self {
            PickerOutcome::Jumped { query, .. } | PickerOutcome::Cancelled { query } => query,
        }
    }
}

#[async_trait]
pub trait Picker: Send {
    async fn pick(&mut self, request: PickerRequest<'_>) -> anyhow::Result<PickerOutcome>;
}
