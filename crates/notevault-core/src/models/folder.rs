//! Folder model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A unique identifier for a folder
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(String);

impl FolderId {
    /// Create a new unique folder ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FolderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FolderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FolderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A folder in the note tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Parent folder; `None` means root
    #[serde(default)]
    pub parent_id: Option<FolderId>,
    #[serde(default)]
    pub is_expanded: bool,
    #[serde(default)]
    pub order: Option<f64>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<i64>,
}

fn default_color() -> String {
    "#6b7280".to_string()
}

impl Folder {
    /// Create a new root-level folder
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = crate::util::now_ms();
        Self {
            id: FolderId::new(),
            name: name.into(),
            color: default_color(),
            icon: None,
            parent_id: None,
            is_expanded: true,
            order: None,
            created_at: now,
            updated_at: now,
            is_archived: false,
            archived_at: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<FolderId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn under(mut self, parent_id: FolderId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn apply(&mut self, patch: FolderPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(icon) = patch.icon {
            self.icon = icon;
        }
        if let Some(parent_id) = patch.parent_id {
            self.parent_id = parent_id;
        }
        if let Some(is_expanded) = patch.is_expanded {
            self.is_expanded = is_expanded;
        }
        if let Some(order) = patch.order {
            self.order = Some(order);
        }
    }
}

/// Fields to merge over an existing folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<Option<String>>,
    pub parent_id: Option<Option<FolderId>>,
    pub is_expanded: Option<bool>,
    pub order: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_new_is_root() {
        let folder = Folder::new("Work");
        assert_eq!(folder.name, "Work");
        assert!(folder.parent_id.is_none());
        assert!(!folder.is_archived);
    }

    #[test]
    fn test_apply_reparents() {
        let mut folder = Folder::new("Child").under(FolderId::from("a"));
        folder.apply(FolderPatch {
            parent_id: Some(None),
            ..FolderPatch::default()
        });
        assert!(folder.parent_id.is_none());
    }
}
