//! Result list state of the picker
//!
//! Applies search messages of the current revision to the candidate list.
//! Results of the previous revision stay visible until the first batch of
//! the new one arrives (or the new one completes empty).

use crate::actors::SearchMessage;
use crate::search::Candidate;

/// Progress of the current revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    Idle,
    Searching,
    Done,
    Failed(String),
}

/// What the picker should do after a message was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    Updated,
    Failed(String),
}

/// One row of the rendered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row<'a> {
    /// File header in grouped display
    Header(&'a str),
    /// Index into the candidate list
    Item(usize),
}

pub struct ResultList {
    candidates: Vec<Candidate>,
    /// Indices of candidates passing the local filter
    visible: Vec<usize>,
    /// Position in `visible`
    selected: usize,
    grouped: bool,
    group: fn(&Candidate) -> &str,
    status: SearchStatus,
    /// The shown candidates belong to the current revision
    fresh: bool,
    filter: LocalFilter,
}

/// Smart case substring filter over display text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LocalFilter {
    needle: String,
    ignore_case: bool,
}

impl LocalFilter {
    fn new(text: &str) -> Self {
        let ignore_case = !text.chars().any(char::is_uppercase);
        let needle = if ignore_case {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        Self {
            needle,
            ignore_case,
        }
    }

    fn matches(&self, candidate: &Candidate) -> bool {
        if self.needle.is_empty() {
            return true;
        }
        if self.ignore_case {
            candidate.display().to_lowercase().contains(&self.needle)
        } else {
            candidate.display().contains(&self.needle)
        }
    }
}

impl ResultList {
    pub fn new(group: fn(&Candidate) -> &str, grouped: bool) -> Self {
        Self {
            candidates: Vec::new(),
            visible: Vec::new(),
            selected: 0,
            grouped,
            group,
            status: SearchStatus::Idle,
            fresh: false,
            filter: LocalFilter::default(),
        }
    }

    /// A new revision was issued.
    pub fn begin_revision(&mut self) {
        self.status = SearchStatus::Searching;
        self.fresh = false;
    }

    /// Narrow the shown candidates to those containing `text`.
    pub fn set_filter(&mut self, text: &str) {
        let filter = LocalFilter::new(text);
        if filter == self.filter {
            return;
        }
        let selected = self.selected_index();
        self.filter = filter;
        self.visible = (0..self.candidates.len())
            .filter(|&i| self.filter.matches(&self.candidates[i]))
            .collect();
        // Keep the cursor on the same candidate when it is still shown.
        self.selected = selected
            .and_then(|index| self.visible.iter().position(|&i| i == index))
            .unwrap_or(0);
    }

    pub fn apply(&mut self, message: SearchMessage) -> ListEvent {
        match message {
            SearchMessage::PushCandidates { candidates, .. } => {
                if !self.fresh {
                    self.clear();
                }
                for candidate in candidates {
                    if self.filter.matches(&candidate) {
                        self.visible.push(self.candidates.len());
                    }
                    self.candidates.push(candidate);
                }
                ListEvent::Updated
            }
            SearchMessage::CompleteSearch { .. } => {
                if !self.fresh {
                    self.clear();
                }
                self.status = SearchStatus::Done;
                ListEvent::Updated
            }
            SearchMessage::ClearResults { .. } => {
                self.clear();
                self.status = SearchStatus::Idle;
                ListEvent::Updated
            }
            SearchMessage::SearchFailed { message, .. } => {
                self.status = SearchStatus::Failed(message.clone());
                ListEvent::Failed(message)
            }
            SearchMessage::UpdateQuery(_) | SearchMessage::AbortSearch => ListEvent::Updated,
        }
    }

    fn clear(&mut self) {
        self.candidates.clear();
        self.visible.clear();
        self.selected = 0;
        self.fresh = true;
    }

    /// Every candidate of the shown revision, filtered or not.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Number of candidates passing the local filter.
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn status(&self) -> &SearchStatus {
        &self.status
    }

    pub fn grouped(&self) -> bool {
        self.grouped
    }

    pub fn toggle_grouped(&mut self) {
        self.grouped = !self.grouped;
    }

    /// Position of the cursor among the shown candidates.
    pub fn selected_position(&self) -> Option<usize> {
        (!self.visible.is_empty()).then_some(self.selected)
    }

    /// Index into [`ResultList::candidates`] of the selected candidate.
    pub fn selected_index(&self) -> Option<usize> {
        self.visible.get(self.selected).copied()
    }

    pub fn selected(&self) -> Option<&Candidate> {
        self.selected_index().map(|i| &self.candidates[i])
    }

    pub fn select_next(&mut self) {
        if !self.visible.is_empty() {
            self.selected = (self.selected + 1) % self.visible.len();
        }
    }

    pub fn select_previous(&mut self) {
        if !self.visible.is_empty() {
            self.selected = self
                .selected
                .checked_sub(1)
                .unwrap_or(self.visible.len() - 1);
        }
    }

    /// Rows to render, with file headers when grouped.
    pub fn rows(&self) -> Vec<Row<'_>> {
        if !self.grouped {
            return self.visible.iter().copied().map(Row::Item).collect();
        }

        let mut rows = Vec::with_capacity(self.visible.len());
        let mut last_group: Option<&str> = None;
        for &index in &self.visible {
            let key = (self.group)(&self.candidates[index]);
            if last_group != Some(key) {
                rows.push(Row::Header(key));
                last_group = Some(key);
            }
            rows.push(Row::Item(index));
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{group_key, CandidateFormatter, LineParser};

    fn push(revision: u64, lines: &[&str]) -> SearchMessage {
        let mut parser = LineParser::new(300);
        let formatter = CandidateFormatter::default();
        SearchMessage::PushCandidates {
            revision,
            candidates: lines
                .iter()
                .map(|l| formatter.format(parser.parse(l).unwrap()))
                .collect(),
        }
    }

    fn displays(list: &ResultList) -> Vec<&str> {
        list.candidates().iter().map(|c| c.display()).collect()
    }

    #[test]
    fn test_old_results_stay_until_first_batch() {
        let mut list = ResultList::new(group_key, false);
        list.begin_revision();
        list.apply(push(1, &["a:1:1:x", "a:2:1:y"]));
        list.apply(push(1, &["b:1:1:z"]));
        list.apply(SearchMessage::CompleteSearch { revision: 1 });
        assert_eq!(list.len(), 3);

        list.begin_revision();
        assert_eq!(list.len(), 3, "previous results remain visible");
        list.apply(push(2, &["c:1:1:w"]));
        assert_eq!(displays(&list), vec!["c:1:1:w"]);
    }

    #[test]
    fn test_empty_completion_clears() {
        let mut list = ResultList::new(group_key, false);
        list.begin_revision();
        list.apply(push(1, &["a:1:1:x"]));
        list.begin_revision();
        list.apply(SearchMessage::CompleteSearch { revision: 2 });
        assert!(list.is_empty());
        assert_eq!(list.status(), &SearchStatus::Done);
    }

    #[test]
    fn test_failure_keeps_results() {
        let mut list = ResultList::new(group_key, false);
        list.begin_revision();
        list.apply(push(1, &["a:1:1:x"]));
        list.begin_revision();
        let event = list.apply(SearchMessage::SearchFailed {
            revision: 2,
            message: "boom".to_string(),
        });
        assert_eq!(event, ListEvent::Failed("boom".to_string()));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_selection_wraps() {
        let mut list = ResultList::new(group_key, false);
        assert!(list.selected().is_none());
        list.begin_revision();
        list.apply(push(1, &["a:1:1:x", "a:2:1:y"]));

        list.select_previous();
        assert_eq!(list.selected().unwrap().display(), "a:2:1:y");
        list.select_next();
        assert_eq!(list.selected_index(), Some(0));
    }

    #[test]
    fn test_grouped_rows() {
        let mut list = ResultList::new(group_key, true);
        list.begin_revision();
        list.apply(push(1, &["a:1:1:x", "a:2:1:y", "b:1:1:z"]));
        assert_eq!(
            list.rows(),
            vec![
                Row::Header("a"),
                Row::Item(0),
                Row::Item(1),
                Row::Header("b"),
                Row::Item(2)
            ]
        );

        list.toggle_grouped();
        assert_eq!(list.rows().len(), 3);
    }

    #[test]
    fn test_local_filter_narrows_rows() {
        let mut list = ResultList::new(group_key, true);
        list.begin_revision();
        list.apply(push(1, &["a:1:1:fn main", "a:2:1:let x", "b:1:1:Main loop"]));
        list.select_next();
        list.select_next();
        assert_eq!(list.selected().unwrap().display(), "b:1:1:Main loop");

        list.set_filter("main");
        assert_eq!(list.len(), 2);
        assert_eq!(list.candidates().len(), 3);
        // The cursor stays on the same candidate.
        assert_eq!(list.selected().unwrap().display(), "b:1:1:Main loop");
        assert_eq!(list.selected_position(), Some(1));
        assert_eq!(
            list.rows(),
            vec![Row::Header("a"), Row::Item(0), Row::Header("b"), Row::Item(2)]
        );

        // Uppercase makes the filter case sensitive.
        list.set_filter("Main");
        assert_eq!(list.len(), 1);
        assert_eq!(list.selected_index(), Some(2));

        // Later batches are filtered as they arrive.
        list.apply(push(1, &["c:1:1:main again", "c:2:1:other"]));
        list.set_filter("main");
        assert_eq!(list.len(), 3);

        list.set_filter("");
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn test_filter_hiding_everything() {
        let mut list = ResultList::new(group_key, false);
        list.begin_revision();
        list.apply(push(1, &["a:1:1:x"]));
        list.set_filter("nothing");
        assert!(list.is_empty());
        assert!(list.selected().is_none());
        assert_eq!(list.selected_position(), None);
        list.select_next();
        assert!(list.rows().is_empty());
    }
}
