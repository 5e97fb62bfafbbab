//! The key-value substrate every tier is stored in.
//!
//! A [`StorageArea`] is a quota-limited, whole-value key-value store: the
//! unit of atomicity is one key's value, there are no transactions, and a
//! write that would exceed the quota is refused. Each successful mutation is
//! broadcast as a [`StorageChange`] so views can re-read instead of trusting
//! their last snapshot.
//!
//! ## Layout
//!
//! ```text
//! primary area
//! ├── primary-document   StorageSchema
//! ├── archive-metadata   { folderId: ArchiveMetadata }
//! ├── backup-ring        [BackupSnapshot; <= backupRingSize]
//! ├── trash-notes        [Trashed<Note>]
//! ├── trash-folders      [Trashed<Folder>]
//! └── version-history    { noteId: [VersionSnapshot; <= versionHistoryDepth] }
//!
//! session area
//! └── emergency-export   { timestamp, data: StorageSchema }
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::{Error, Result};

mod file;
mod memory;

pub use file::JsonFileStorageArea;
pub use memory::MemoryStorageArea;

pub const PRIMARY_DOCUMENT_KEY: &str = "primary-document";
pub const ARCHIVE_METADATA_KEY: &str = "archive-metadata";
pub const BACKUP_RING_KEY: &str = "backup-ring";
pub const TRASH_NOTES_KEY: &str = "trash-notes";
pub const TRASH_FOLDERS_KEY: &str = "trash-folders";
pub const VERSION_HISTORY_KEY: &str = "version-history";
pub const EMERGENCY_EXPORT_KEY: &str = "emergency-export";

/// Capacity of a browser extension's local storage area.
pub const DEFAULT_QUOTA_BYTES: u64 = 10 * 1024 * 1024;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A mutation of one key, carrying its old and new values.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Asynchronous whole-value key-value store.
#[async_trait]
pub trait StorageArea: Send + Sync {
    /// Read one key. Absent keys are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace one key's value. Fails with [`Error::QuotaExceeded`] and
    /// leaves the area untouched if the result would not fit.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Delete one key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Bytes currently occupied.
    async fn bytes_in_use(&self) -> Result<u64>;

    /// Capacity ceiling, if the area has one.
    fn quota_bytes(&self) -> Option<u64>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Read and deserialize a key.
pub async fn read_json<T: DeserializeOwned>(
    area: &dyn StorageArea,
    key: &str,
) -> Result<Option<T>> {
    match area.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and write a key.
pub async fn write_json<T: Serialize + Sync + ?Sized>(
    area: &dyn StorageArea,
    key: &str,
    value: &T,
) -> Result<()> {
    area.set(key, serde_json::to_value(value)?).await
}

/// Bytes an entry occupies: key plus compact JSON value.
pub(crate) fn entry_size(key: &str, value: &Value) -> u64 {
    let value_len = serde_json::to_string(value).map_or(0, |json| json.len());
    (key.len() + value_len) as u64
}

/// In-memory entry table shared by the concrete areas.
#[derive(Debug, Default)]
pub(crate) struct Entries {
    map: Map<String, Value>,
}

impl Entries {
    pub(crate) const fn from_map(map: Map<String, Value>) -> Self {
        Self { map }
    }

    pub(crate) const fn as_map(&self) -> &Map<String, Value> {
        &self.map
    }

    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        self.map.get(key).cloned()
    }

    pub(crate) fn bytes_in_use(&self) -> u64 {
        self.map
            .iter()
            .map(|(key, value)| entry_size(key, value))
            .sum()
    }

    /// Check that replacing `key` with `value` fits under `quota`.
    pub(crate) fn check_quota(&self, key: &str, value: &Value, quota: Option<u64>) -> Result<()> {
        let Some(quota) = quota else {
            return Ok(());
        };
        let current = self.bytes_in_use();
        let replaced = self.map.get(key).map_or(0, |old| entry_size(key, old));
        let projected = current - replaced + entry_size(key, value);
        if projected > quota {
            return Err(Error::QuotaExceeded(format!(
                "QUOTA_BYTES quota exceeded: writing '{key}' needs {projected} of {quota} bytes"
            )));
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, key: &str, value: Value) -> StorageChange {
        let old_value = self.map.insert(key.to_string(), value.clone());
        StorageChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
        }
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<StorageChange> {
        self.map.remove(key).map(|old| StorageChange {
            key: key.to_string(),
            old_value: Some(old),
            new_value: None,
        })
    }
}

pub(crate) fn change_channel() -> broadcast::Sender<StorageChange> {
    broadcast::channel(CHANGE_CHANNEL_CAPACITY).0
}

/// Publish a change; having no subscribers is normal.
pub(crate) fn publish(sender: &broadcast::Sender<StorageChange>, change: StorageChange) {
    let _ = sender.send(change);
}
