//! Linear undo/redo history.
//!
//! ```text
//! items:  [ h0 | h1 | h2 | h3 ]
//!                     ▲
//!                   index     undo ◄── applies h1.old
//!                             redo ──► applies h2.new
//! ```
//!
//! Recording after an undo truncates everything at and beyond `index`.

use crate::entry::EntryModel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub old: EntryModel,
    pub new: EntryModel,
}

/// What the presentation layer needs to enable its undo/redo controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStatus {
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    items: Vec<HistoryItem>,
    index: usize,
    /// Whether the newest item may absorb the next edit
    open: bool,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index < self.items.len()
    }

    pub fn status(&self) -> HistoryStatus {
        HistoryStatus {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }

    /// Record an edit. Only loaded `old` entries carry an undo value.
    ///
    /// Consecutive edits of the same field of the same entry merge into one
    /// item, so typing a word undoes as a single step.
    pub fn record(&mut self, old: EntryModel, new: EntryModel) {
        if !old.is_loaded() {
            return;
        }
        self.items.truncate(self.index);

        if self.open {
            if let Some(last) = self.items.last_mut() {
                let same_field = new.last_change().is_some()
                    && last.new.key() == new.key()
                    && last.new.last_change() == new.last_change()
                    && last.new.data() == old.data();
                if same_field {
                    last.new = new;
                    return;
                }
            }
        }

        self.items.push(HistoryItem { old, new });
        self.index = self.items.len();
        self.open = true;
    }

    /// Step back; returns the snapshot to apply.
    pub fn undo(&mut self) -> Option<EntryModel> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        self.open = false;
        Some(self.items[self.index].old.clone())
    }

    /// Step forward; returns the snapshot to apply.
    pub fn redo(&mut self) -> Option<EntryModel> {
        if !self.can_redo() {
            return None;
        }
        let entry = self.items[self.index].new.clone();
        self.index += 1;
        self.open = false;
        Some(entry)
    }
}
