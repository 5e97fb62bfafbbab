//! Rotating in-substrate snapshots of the whole primary document.

use std::sync::Arc;

use crate::config::ProtectionConfig;
use crate::error::{Error, Result};
use crate::lock::WriteLock;
use crate::models::{BackupSnapshot, StorageSchema, SCHEMA_VERSION};
use crate::storage::{self, StorageArea, BACKUP_RING_KEY, PRIMARY_DOCUMENT_KEY};
use crate::store;
use crate::util::now_ms;

/// Bounded ring of full-document backups, newest last.
#[derive(Clone)]
pub struct BackupManager {
    area: Arc<dyn StorageArea>,
    lock: Arc<WriteLock>,
    ring_size: usize,
}

impl BackupManager {
    pub fn new(area: Arc<dyn StorageArea>, lock: Arc<WriteLock>, config: &ProtectionConfig) -> Self {
        Self {
            area,
            lock,
            ring_size: config.backup_ring_size,
        }
    }

    /// Snapshot the primary document into the ring.
    ///
    /// Returns `None` without writing when there is nothing worth keeping:
    /// no document, or a document with zero notes.
    pub async fn create_backup(&self) -> Result<Option<BackupSnapshot>> {
        let Some(schema) =
            storage::read_json::<StorageSchema>(self.area.as_ref(), PRIMARY_DOCUMENT_KEY).await?
        else {
            return Ok(None);
        };
        if schema.notes.is_empty() {
            tracing::debug!("Skipping backup of empty primary document");
            return Ok(None);
        }

        let snapshot = BackupSnapshot {
            timestamp: now_ms(),
            version: SCHEMA_VERSION,
            data: schema,
        };

        let mut ring = self.list_backups().await?;
        ring.push(snapshot.clone());
        if ring.len() > self.ring_size {
            let excess = ring.len() - self.ring_size;
            ring.drain(..excess);
        }
        storage::write_json(self.area.as_ref(), BACKUP_RING_KEY, &ring).await?;

        tracing::debug!(
            "Created backup with {} notes ({} in ring)",
            snapshot.data.notes.len(),
            ring.len()
        );
        Ok(Some(snapshot))
    }

    /// Backups in the ring, oldest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupSnapshot>> {
        Ok(storage::read_json(self.area.as_ref(), BACKUP_RING_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Overwrite the primary document with a backup.
    ///
    /// `index` counts from the oldest backup; `None` picks the newest. This is
    /// a full replace, never a merge.
    pub async fn restore_from_backup(&self, index: Option<usize>) -> Result<StorageSchema> {
        let mut ring = self.list_backups().await?;
        let position = match index {
            Some(index) => index,
            None => ring
                .len()
                .checked_sub(1)
                .ok_or_else(|| Error::NotFound("no backups available".to_string()))?,
        };
        if position >= ring.len() {
            return Err(Error::NotFound(format!(
                "backup {position} (ring holds {})",
                ring.len()
            )));
        }
        let snapshot = ring.swap_remove(position);

        store::replace_document(self.area.as_ref(), &self.lock, &snapshot.data).await?;
        tracing::info!(
            "Restored primary document from backup taken at {} ({} notes)",
            snapshot.timestamp,
            snapshot.data.notes.len()
        );
        Ok(snapshot.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;
    use crate::storage::MemoryStorageArea;
    use pretty_assertions::assert_eq;

    fn setup() -> (Arc<MemoryStorageArea>, BackupManager) {
        let area = Arc::new(MemoryStorageArea::unbounded());
        let backups = BackupManager::new(
            area.clone(),
            Arc::new(WriteLock::new()),
            &ProtectionConfig::default(),
        );
        (area, backups)
    }

    async fn write_primary(area: &MemoryStorageArea, titles: &[&str]) -> StorageSchema {
        let schema = StorageSchema {
            notes: titles
                .iter()
                .map(|title| Note::new(*title, "").with_id(*title))
                .collect(),
            ..StorageSchema::default()
        };
        storage::write_json(area, PRIMARY_DOCUMENT_KEY, &schema)
            .await
            .unwrap();
        schema
    }

    #[tokio::test]
    async fn test_skips_empty_documents() {
        let (area, backups) = setup();
        assert!(backups.create_backup().await.unwrap().is_none());

        write_primary(&area, &[]).await;
        assert!(backups.create_backup().await.unwrap().is_none());
        assert!(backups.list_backups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ring_keeps_newest_three() {
        let (area, backups) = setup();
        for round in 0..5 {
            let title = format!("round-{round}");
            write_primary(&area, &[title.as_str()]).await;
            backups.create_backup().await.unwrap().unwrap();
        }

        let ring = backups.list_backups().await.unwrap();
        let titles: Vec<_> = ring.iter().map(|b| b.data.notes[0].title.clone()).collect();
        assert_eq!(titles, vec!["round-2", "round-3", "round-4"]);
    }

    #[tokio::test]
    async fn test_restore_is_a_full_overwrite_and_idempotent() {
        let (area, backups) = setup();
        let original = write_primary(&area, &["a", "b"]).await;
        backups.create_backup().await.unwrap();

        write_primary(&area, &["c"]).await;
        let first = backups.restore_from_backup(None).await.unwrap();
        let after_first = area.get(PRIMARY_DOCUMENT_KEY).await.unwrap();

        write_primary(&area, &["d", "e", "f"]).await;
        let second = backups.restore_from_backup(None).await.unwrap();
        let after_second = area.get(PRIMARY_DOCUMENT_KEY).await.unwrap();

        assert_eq!(first, original);
        assert_eq!(second, original);
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn test_restore_by_index_and_missing_backups() {
        let (area, backups) = setup();
        assert!(matches!(
            backups.restore_from_backup(None).await,
            Err(Error::NotFound(_))
        ));

        write_primary(&area, &["old"]).await;
        backups.create_backup().await.unwrap();
        write_primary(&area, &["new"]).await;
        backups.create_backup().await.unwrap();

        let restored = backups.restore_from_backup(Some(0)).await.unwrap();
        assert_eq!(restored.notes[0].title, "old");
        assert!(matches!(
            backups.restore_from_backup(Some(9)).await,
            Err(Error::NotFound(_))
        ));
    }
}
