//! In-process storage area.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use super::{change_channel, publish, Entries, StorageArea, StorageChange};
use crate::error::Result;

/// A storage area held entirely in memory, with an optional quota.
pub struct MemoryStorageArea {
    entries: Mutex<Entries>,
    quota_bytes: Option<u64>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryStorageArea {
    /// An area that refuses writes past `quota_bytes`.
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            quota_bytes: Some(quota_bytes),
            changes: change_channel(),
        }
    }

    /// An area without a capacity ceiling.
    pub fn unbounded() -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            quota_bytes: None,
            changes: change_channel(),
        }
    }
}

impl Default for MemoryStorageArea {
    fn default() -> Self {
        Self::with_quota(super::DEFAULT_QUOTA_BYTES)
    }
}

#[async_trait]
impl StorageArea for MemoryStorageArea {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let change = {
            let mut entries = self.entries.lock().await;
            entries.check_quota(key, &value, self.quota_bytes)?;
            entries.insert(key, value)
        };
        publish(&self.changes, change);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let change = self.entries.lock().await.remove(key);
        if let Some(change) = change {
            publish(&self.changes, change);
        }
        Ok(())
    }

    async fn bytes_in_use(&self) -> Result<u64> {
        Ok(self.entries.lock().await.bytes_in_use())
    }

    fn quota_bytes(&self) -> Option<u64> {
        self.quota_bytes
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
