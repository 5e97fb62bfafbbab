//! Records kept beside the primary document by the protection tiers.

use serde::{Deserialize, Serialize};

use super::{FolderId, Note, StorageSchema};

/// An entity in the trash, restorable until `can_restore_until`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trashed<T> {
    #[serde(flatten)]
    pub item: T,
    pub deleted_at: i64,
    pub can_restore_until: i64,
}

impl<T> Trashed<T> {
    pub const fn is_expired(&self, now: i64) -> bool {
        self.can_restore_until < now
    }
}

/// A trash entry as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashListing<T> {
    #[serde(flatten)]
    pub entry: Trashed<T>,
    pub days_until_permanent_delete: i64,
}

/// A past revision of a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    #[serde(flatten)]
    pub note: Note,
    pub version_timestamp: i64,
}

/// A full copy of the primary document in the in-substrate backup ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub timestamp: i64,
    pub data: StorageSchema,
    pub version: u32,
}

/// Bookkeeping for a folder whose notes were exported to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub folder_id: FolderId,
    pub folder_name: String,
    pub file_name: String,
    pub archived_at: i64,
    pub notes_count: usize,
}

/// Storage usage summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub bytes_in_use: u64,
    pub quota_bytes: Option<u64>,
    pub percent_used: Option<f64>,
    pub notes_count: usize,
    pub folders_count: usize,
}
