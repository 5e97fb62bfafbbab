//! Fallback chain for an unreadable primary document.

use crate::backup::BackupManager;
use crate::bridge::ExternalBridge;
use crate::error::{Error, Result};

/// Which tier a recovered document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    BackupRing,
    DurableSnapshot,
}

/// Backup ring first, then the durable bridge.
pub struct RecoveryChain {
    backups: BackupManager,
    bridge: Option<ExternalBridge>,
}

impl RecoveryChain {
    pub const fn new(backups: BackupManager, bridge: Option<ExternalBridge>) -> Self {
        Self { backups, bridge }
    }

    /// Overwrite the primary document from the first tier that can supply one.
    pub async fn recover(&self) -> Result<RecoverySource> {
        match self.backups.restore_from_backup(None).await {
            Ok(schema) => {
                tracing::info!("Recovered {} notes from backup ring", schema.notes.len());
                return Ok(RecoverySource::BackupRing);
            }
            Err(error) => tracing::warn!("Backup ring recovery failed: {error}"),
        }

        let Some(bridge) = &self.bridge else {
            return Err(Error::NotFound(
                "no recovery tier could supply a primary document".to_string(),
            ));
        };
        match bridge.restore_latest().await {
            Ok(schema) => {
                tracing::info!("Recovered {} notes from durable snapshot", schema.notes.len());
                Ok(RecoverySource::DurableSnapshot)
            }
            Err(error) => {
                tracing::error!("Durable snapshot recovery failed: {error}");
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtectionConfig;
    use crate::db::{Database, SnapshotKind};
    use crate::lock::WriteLock;
    use crate::models::{Note, StorageSchema};
    use crate::storage::{self, MemoryStorageArea, PRIMARY_DOCUMENT_KEY};
    use std::sync::Arc;

    struct Fixture {
        area: Arc<MemoryStorageArea>,
        backups: BackupManager,
        bridge: ExternalBridge,
    }

    async fn setup() -> Fixture {
        let area = Arc::new(MemoryStorageArea::unbounded());
        let lock = Arc::new(WriteLock::new());
        let config = ProtectionConfig::default();
        let db = Database::open_in_memory().await.unwrap();
        Fixture {
            backups: BackupManager::new(area.clone(), lock.clone(), &config),
            bridge: ExternalBridge::new(db, area.clone(), lock, &config),
            area,
        }
    }

    fn schema_with(titles: &[&str]) -> StorageSchema {
        StorageSchema {
            notes: titles.iter().map(|title| Note::new(*title, "")).collect(),
            ..StorageSchema::default()
        }
    }

    async fn primary_titles(area: &MemoryStorageArea) -> Vec<String> {
        storage::read_json::<StorageSchema>(area, PRIMARY_DOCUMENT_KEY)
            .await
            .unwrap()
            .unwrap()
            .notes
            .into_iter()
            .map(|note| note.title)
            .collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prefers_backup_ring() {
        let fixture = setup().await;
        storage::write_json(fixture.area.as_ref(), PRIMARY_DOCUMENT_KEY, &schema_with(&["ring"]))
            .await
            .unwrap();
        fixture.backups.create_backup().await.unwrap();
        fixture
            .bridge
            .save_snapshot(&schema_with(&["durable"]), SnapshotKind::Manual)
            .await
            .unwrap();

        let chain = RecoveryChain::new(fixture.backups, Some(fixture.bridge));
        assert_eq!(chain.recover().await.unwrap(), RecoverySource::BackupRing);
        assert_eq!(primary_titles(&fixture.area).await, vec!["ring"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_falls_back_to_durable_snapshot() {
        let fixture = setup().await;
        fixture
            .bridge
            .save_snapshot(&schema_with(&["durable"]), SnapshotKind::Auto)
            .await
            .unwrap();

        let chain = RecoveryChain::new(fixture.backups, Some(fixture.bridge));
        assert_eq!(chain.recover().await.unwrap(), RecoverySource::DurableSnapshot);
        assert_eq!(primary_titles(&fixture.area).await, vec!["durable"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fails_when_every_tier_is_empty() {
        let fixture = setup().await;
        let without_bridge = RecoveryChain::new(fixture.backups.clone(), None);
        assert!(matches!(without_bridge.recover().await, Err(Error::NotFound(_))));

        let with_bridge = RecoveryChain::new(fixture.backups, Some(fixture.bridge));
        assert!(with_bridge.recover().await.is_err());
    }
}
