//! Immutable entry values.
//!
//! Every mutator returns a new [`EntryModel`]; nothing is changed in place.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Description persisted for an entry the user deleted.
pub const DELETED_DESCRIPTION: &str = "deleted";

/// Text payload of a loaded entry, persisted as `{"left":…,"right":…}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryText {
    #[serde(default)]
    pub left: String,
    #[serde(default)]
    pub right: String,
}

impl EntryText {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn encode(&self) -> String {
        // Two plain strings always serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    /// `None` for empty or unparsable values, which count as missing data.
    pub fn decode(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        serde_json::from_str(raw).ok()
    }
}

/// Load state of an entry, or its text once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryData {
    /// Placeholder beyond the initial visible window
    Hidden,
    /// Fetch in flight
    Loading,
    Deleted,
    Loaded(EntryText),
}

/// Which text field a mutator touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryModel {
    key: String,
    data: EntryData,
    /// Opaque metadata; creation time in epoch millis for entries made here
    description: String,
    focused: bool,
    initially_collapsed: bool,
    last_change: Option<Field>,
}

impl EntryModel {
    pub fn new(key: impl Into<String>, data: EntryData, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data,
            description: description.into(),
            focused: false,
            initially_collapsed: false,
            last_change: None,
        }
    }

    /// A blank loaded entry stamped with the current time.
    pub fn blank(key: impl Into<String>) -> Self {
        Self::new(
            key,
            EntryData::Loaded(EntryText::default()),
            timestamp_description(),
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn data(&self) -> &EntryData {
        &self.data
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn focused(&self) -> bool {
        self.focused
    }

    pub fn initially_collapsed(&self) -> bool {
        self.initially_collapsed
    }

    pub fn last_change(&self) -> Option<Field> {
        self.last_change
    }

    pub fn text(&self) -> Option<&EntryText> {
        match &self.data {
            EntryData::Loaded(text) => Some(text),
            _ => None,
        }
    }

    /// Left text, or `""` when not loaded.
    pub fn left(&self) -> &str {
        self.text().map(|t| t.left.as_str()).unwrap_or("")
    }

    /// Right text, or `""` when not loaded.
    pub fn right(&self) -> &str {
        self.text().map(|t| t.right.as_str()).unwrap_or("")
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.data, EntryData::Loaded(_))
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.data, EntryData::Deleted)
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self.data, EntryData::Hidden)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.data, EntryData::Loading)
    }

    /// Creation time in epoch millis, if the description carries one.
    pub fn created_at(&self) -> Option<u64> {
        self.description.parse().ok()
    }

    pub fn with_left(&self, left: impl Into<String>) -> Self {
        let mut text = self.text().cloned().unwrap_or_default();
        text.left = left.into();
        Self {
            data: EntryData::Loaded(text),
            last_change: Some(Field::Left),
            ..self.clone()
        }
    }

    pub fn with_right(&self, right: impl Into<String>) -> Self {
        let mut text = self.text().cloned().unwrap_or_default();
        text.right = right.into();
        Self {
            data: EntryData::Loaded(text),
            last_change: Some(Field::Right),
            ..self.clone()
        }
    }

    pub fn with_data(&self, data: EntryData) -> Self {
        Self {
            data,
            last_change: None,
            ..self.clone()
        }
    }

    pub fn with_description(&self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..self.clone()
        }
    }

    pub fn delete(&self) -> Self {
        self.with_data(EntryData::Deleted)
    }

    /// Empty text, keeping key and description.
    pub fn cleared(&self) -> Self {
        self.with_data(EntryData::Loaded(EntryText::default()))
    }

    pub fn with_focus(&self, focused: bool) -> Self {
        Self {
            focused,
            ..self.clone()
        }
    }

    pub fn with_collapsed(&self, initially_collapsed: bool) -> Self {
        Self {
            initially_collapsed,
            ..self.clone()
        }
    }

    /// Description to persist: the deleted sentinel for deleted entries.
    pub fn persisted_description(&self) -> &str {
        if self.is_deleted() {
            DELETED_DESCRIPTION
        } else {
            &self.description
        }
    }
}

/// Current time in epoch millis, as an entry description.
pub fn timestamp_description() -> String {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}
