//! Query line editing
//!
//! Emacs-style editing of the query text. The cursor counts characters, not
//! bytes, so multi-byte input edits cleanly.

/// Editing operations on the query line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOperation {
    InsertChar(char),
    MoveCursorToStart,
    MoveCursorToEnd,
    MoveCursorLeft,
    MoveCursorRight,
    DeleteCharForward,
    DeleteCharBackward,
    DeleteWordBackward,
    /// Delete everything before the cursor
    ClearLine,
    /// Delete everything after the cursor into the kill ring
    KillLine,
    Yank,
}

/// Query text with a cursor and a one-entry kill ring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryInput {
    text: String,
    cursor: usize,
    kill_ring: String,
}

impl QueryInput {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.chars().count();
        Self {
            text,
            cursor,
            kill_ring: String::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cursor position in characters.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Replace the text, moving the cursor to its end.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.cursor = self.text.chars().count();
    }

    /// Apply `operation`, returning whether the text changed.
    pub fn apply(&mut self, operation: InputOperation) -> bool {
        let len = self.text.chars().count();
        match operation {
            InputOperation::InsertChar(c) => {
                let at = self.byte_index(self.cursor);
                self.text.insert(at, c);
                self.cursor += 1;
                true
            }
            InputOperation::MoveCursorToStart => {
                self.cursor = 0;
                false
            }
            InputOperation::MoveCursorToEnd => {
                self.cursor = len;
                false
            }
            InputOperation::MoveCursorLeft => {
                self.cursor = self.cursor.saturating_sub(1);
                false
            }
            InputOperation::MoveCursorRight => {
                self.cursor = (self.cursor + 1).min(len);
                false
            }
            InputOperation::DeleteCharForward => {
                if self.cursor >= len {
                    return false;
                }
                let at = self.byte_index(self.cursor);
                self.text.remove(at);
                true
            }
            InputOperation::DeleteCharBackward => {
                if self.cursor == 0 {
                    return false;
                }
                self.cursor -= 1;
                let at = self.byte_index(self.cursor);
                self.text.remove(at);
                true
            }
            InputOperation::DeleteWordBackward => {
                let chars: Vec<char> = self.text.chars().collect();
                let mut start = self.cursor;
                while start > 0 && chars[start - 1].is_whitespace() {
                    start -= 1;
                }
                while start > 0 && !chars[start - 1].is_whitespace() {
                    start -= 1;
                }
                if start == self.cursor {
                    return false;
                }
                let (from, to) = (self.byte_index(start), self.byte_index(self.cursor));
                self.text.replace_range(from..to, "");
                self.cursor = start;
                true
            }
            InputOperation::ClearLine => {
                if self.cursor == 0 {
                    return false;
                }
                let to = self.byte_index(self.cursor);
                self.text.replace_range(..to, "");
                self.cursor = 0;
                true
            }
            InputOperation::KillLine => {
                if self.cursor >= len {
                    return false;
                }
                let at = self.byte_index(self.cursor);
                self.kill_ring = self.text.split_off(at);
                true
            }
            InputOperation::Yank => {
                if self.kill_ring.is_empty() {
                    return false;
                }
                let at = self.byte_index(self.cursor);
                self.text.insert_str(at, &self.kill_ring);
                self.cursor += self.kill_ring.chars().count();
                true
            }
        }
    }

    fn byte_index(&self, chars: usize) -> usize {
        self.text
            .char_indices()
            .nth(chars)
            .map_or(self.text.len(), |(i, _)| i)
    }
}
