//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::FolderId;

/// A unique identifier for a note.
///
/// Freshly created notes get a UUID v7 (time-sortable), but any string is
/// accepted so documents written by older clients keep their ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A note in the primary document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    #[serde(default)]
    pub title: String,
    /// Serialized rich text
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Owning folder; `None` means root
    #[serde(default)]
    pub folder_id: Option<FolderId>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms), never below `created_at`
    pub updated_at: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<i64>,
    /// Display order; notes without one sort last
    #[serde(default)]
    pub order: Option<f64>,
}

impl Note {
    /// Create a new root-level note
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = crate::util::now_ms();
        Self {
            id: NoteId::new(),
            title: title.into(),
            content: content.into(),
            color: None,
            folder_id: None,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            is_pinned: false,
            is_archived: false,
            archived_at: None,
            order: None,
        }
    }

    /// Builder-style id override, mostly for fixtures and imports.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<NoteId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn in_folder(mut self, folder_id: FolderId) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    #[must_use]
    pub const fn with_order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }

    /// Apply a partial update. Timestamps are left to the caller.
    pub fn apply(&mut self, patch: NotePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(folder_id) = patch.folder_id {
            self.folder_id = folder_id;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(is_pinned) = patch.is_pinned {
            self.is_pinned = is_pinned;
        }
        if let Some(is_archived) = patch.is_archived {
            self.is_archived = is_archived;
            self.archived_at = is_archived.then(crate::util::now_ms);
        }
        if let Some(order) = patch.order {
            self.order = Some(order);
        }
    }
}

/// Fields to merge over an existing note. `None` leaves a field untouched;
/// for nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub color: Option<Option<String>>,
    pub folder_id: Option<Option<FolderId>>,
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
    pub is_archived: Option<bool>,
    pub order: Option<f64>,
}

impl NotePatch {
    #[must_use]
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}
