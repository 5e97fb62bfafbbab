//! The primary document: every note, folder and setting in one record.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::{Folder, FolderId, Note, NoteId, Settings};

/// Current version of the primary document layout.
pub const SCHEMA_VERSION: u32 = 2;

/// The single record holding the whole application state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSchema {
    pub version: u32,
    pub notes: Vec<Note>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub settings: Settings,
    /// Last focused note; a weak reference that may dangle
    #[serde(default)]
    pub current_note_id: Option<NoteId>,
    /// Last focused folder; a weak reference that may dangle
    #[serde(default)]
    pub current_folder_id: Option<FolderId>,
}

impl Default for StorageSchema {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            notes: Vec::new(),
            folders: Vec::new(),
            settings: Settings::default(),
            current_note_id: None,
            current_folder_id: None,
        }
    }
}

impl StorageSchema {
    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    pub fn note_mut(&mut self, id: &NoteId) -> Option<&mut Note> {
        self.notes.iter_mut().find(|note| &note.id == id)
    }

    pub fn folder(&self, id: &FolderId) -> Option<&Folder> {
        self.folders.iter().find(|folder| &folder.id == id)
    }

    pub fn folder_mut(&mut self, id: &FolderId) -> Option<&mut Folder> {
        self.folders.iter_mut().find(|folder| &folder.id == id)
    }

    /// Notes in display order.
    pub fn sorted_notes(&self) -> Vec<Note> {
        let mut notes = self.notes.clone();
        notes.sort_by(|a, b| display_order(a.order, a.updated_at, b.order, b.updated_at));
        notes
    }

    /// Folders in display order.
    pub fn sorted_folders(&self) -> Vec<Folder> {
        let mut folders = self.folders.clone();
        folders.sort_by(|a, b| display_order(a.order, a.updated_at, b.order, b.updated_at));
        folders
    }

    /// Whether making `parent` the parent of `folder` would close a loop.
    pub fn would_cycle(&self, folder: &FolderId, parent: &FolderId) -> bool {
        let mut cursor = Some(parent.clone());
        let mut hops = 0;
        while let Some(current) = cursor {
            if &current == folder {
                return true;
            }
            hops += 1;
            if hops > self.folders.len() {
                // An existing loop that does not pass through `folder`.
                return true;
            }
            cursor = self
                .folder(&current)
                .and_then(|found| found.parent_id.clone());
        }
        false
    }
}

/// Ascending `order` with missing orders last, ties broken by most recent
/// update first.
pub fn display_order(
    a_order: Option<f64>,
    a_updated: i64,
    b_order: Option<f64>,
    b_updated: i64,
) -> Ordering {
    let by_order = match (a_order, b_order) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_order.then_with(|| b_updated.cmp(&a_updated))
}
