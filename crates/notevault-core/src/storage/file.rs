//! Storage area persisted to a single JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};

use super::{change_channel, publish, Entries, StorageArea, StorageChange};
use crate::error::{Error, Result};
use crate::util::compact_text;

/// A storage area whose whole content is rewritten to disk on every change.
///
/// The file is replaced through a sibling temp file and a rename, so a crash
/// mid-write leaves either the old or the new content on disk.
pub struct JsonFileStorageArea {
    path: PathBuf,
    entries: Mutex<Entries>,
    quota_bytes: Option<u64>,
    changes: broadcast::Sender<StorageChange>,
}

impl JsonFileStorageArea {
    /// Open (or create) the area backed by `path`.
    pub async fn open(path: impl Into<PathBuf>, quota_bytes: Option<u64>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let map = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::Storage(format!(
                        "{} does not contain a JSON object: {}",
                        path.display(),
                        compact_text(&String::from_utf8_lossy(&bytes))
                    )))
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(error) => return Err(error.into()),
        };
        tracing::debug!("Opened storage area at {} ({} keys)", path.display(), map.len());

        Ok(Self {
            path,
            entries: Mutex::new(Entries::from_map(map)),
            quota_bytes,
            changes: change_channel(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, map: &Map<String, Value>) -> Result<()> {
        let bytes = serde_json::to_vec(map)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageArea for JsonFileStorageArea {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let change = {
            let mut entries = self.entries.lock().await;
            entries.check_quota(key, &value, self.quota_bytes)?;
            let mut next = Entries::from_map(entries.as_map().clone());
            let change = next.insert(key, value);
            self.persist(next.as_map()).await?;
            *entries = next;
            change
        };
        publish(&self.changes, change);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let change = {
            let mut entries = self.entries.lock().await;
            let mut next = Entries::from_map(entries.as_map().clone());
            let Some(change) = next.remove(key) else {
                return Ok(());
            };
            self.persist(next.as_map()).await?;
            *entries = next;
            change
        };
        publish(&self.changes, change);
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
