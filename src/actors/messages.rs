use crate::search::Candidate;
use std::sync::Arc;

pub const UPDATE_QUERY: &str = "updateQuery";
pub const ABORT_SEARCH: &str = "abortSearch";
pub const CLEAR_RESULTS: &str = "clearResults";
pub const PUSH_CANDIDATES: &str = "pushCandidates";
pub const COMPLETE_SEARCH: &str = "completeSearch";
pub const SEARCH_FAILED: &str = "searchFailed";

/// Query text in effect at one point in time, numbered in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRevision {
    pub id: u64,
    pub text: Arc<str>,
}

#[derive(Debug, Clone)]
pub enum SearchMessage {
    UpdateQuery(QueryRevision),
    AbortSearch,
    /// The revision needs no search; drop whatever is shown
    ClearResults { revision: u64 },
    PushCandidates {
        revision: u64,
        candidates: Vec<Candidate>,
    },
    CompleteSearch { revision: u64 },
    /// Visible, non-fatal failure of one revision
    SearchFailed { revision: u64, message: String },
}

impl SearchMessage {
    /// Revision an outbound message belongs to.
    pub fn revision(&self) -> Option<u64> {
        match self {
            SearchMessage::UpdateQuery(query) => Some(query.id),
            SearchMessage::AbortSearch => None,
            SearchMessage::ClearResults { revision }
            | SearchMessage::PushCandidates { revision, .. }
            | SearchMessage::CompleteSearch { revision }
            | SearchMessage::SearchFailed { revision, .. } => Some(*revision),
        }
    }
}
