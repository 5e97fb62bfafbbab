//! Per-note revision history.
//!
//! Best effort by contract: [`VersionHistory::save_version`] never returns an
//! error, it logs. A failed capture must not fail the edit that caused it.
//!
//! All revisions share one stored value. Writers queue on the history's own
//! lock, and each revision is slotted by its capture time, so captures that
//! land late still end up in edit order.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::ProtectionConfig;
use crate::error::Result;
use crate::models::{Note, NoteId, VersionSnapshot};
use crate::storage::{self, StorageArea, VERSION_HISTORY_KEY};
use crate::util::now_ms;

type HistoryMap = BTreeMap<NoteId, Vec<VersionSnapshot>>;

/// Bounded revision log keyed by note id, oldest revision first.
#[derive(Clone)]
pub struct VersionHistory {
    area: Arc<dyn StorageArea>,
    depth: usize,
    guard: Arc<Mutex<()>>,
}

impl VersionHistory {
    pub fn new(area: Arc<dyn StorageArea>, config: &ProtectionConfig) -> Self {
        Self {
            area,
            depth: config.version_history_depth,
            guard: Arc::new(Mutex::new(())),
        }
    }

    async fn load(&self) -> Result<HistoryMap> {
        Ok(storage::read_json(self.area.as_ref(), VERSION_HISTORY_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Record `note` as the newest revision, evicting the oldest past the cap.
    pub async fn save_version(&self, note: &Note) {
        self.save_version_at(note, now_ms()).await;
    }

    /// Record `note` as it was at `captured_at`, evicting the oldest past the
    /// cap. Revisions with equal capture times keep their arrival order.
    pub async fn save_version_at(&self, note: &Note, captured_at: i64) {
        if let Err(error) = self.try_save_version(note, captured_at).await {
            tracing::warn!("Failed to save version of note {}: {error}", note.id);
        }
    }

    async fn try_save_version(&self, note: &Note, captured_at: i64) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut history = self.load().await?;
        let versions = history.entry(note.id.clone()).or_default();
        let slot = versions.partition_point(|version| version.version_timestamp <= captured_at);
        versions.insert(
            slot,
            VersionSnapshot {
                note: note.clone(),
                version_timestamp: captured_at,
            },
        );
        if versions.len() > self.depth {
            let excess = versions.len() - self.depth;
            versions.drain(..excess);
        }
        storage::write_json(self.area.as_ref(), VERSION_HISTORY_KEY, &history).await
    }

    /// Revisions of one note, oldest first.
    pub async fn list_versions(&self, note_id: &NoteId) -> Result<Vec<VersionSnapshot>> {
        Ok(self.load().await?.remove(note_id).unwrap_or_default())
    }

    /// The note as it was at revision `index` (0 = oldest kept).
    pub async fn restore_version(&self, note_id: &NoteId, index: usize) -> Result<Option<Note>> {
        Ok(self
            .list_versions(note_id)
            .await?
            .into_iter()
            .nth(index)
            .map(|snapshot| snapshot.note))
    }

    /// Forget every revision of one note.
    pub async fn remove_history(&self, note_id: &NoteId) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut history = self.load().await?;
        if history.remove(note_id).is_some() {
            storage::write_json(self.area.as_ref(), VERSION_HISTORY_KEY, &history).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::{MemoryStorageArea, StorageChange};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tokio::sync::broadcast;

    fn setup() -> VersionHistory {
        let area = Arc::new(MemoryStorageArea::unbounded());
        VersionHistory::new(area, &ProtectionConfig::default())
    }

    #[tokio::test]
    async fn test_keeps_last_five_oldest_first() {
        let history = setup();
        let mut note = Note::new("t", "").with_id("n1");
        for revision in 0..7 {
            note.content = format!("rev-{revision}");
            history.save_version(&note).await;
        }

        let versions = history.list_versions(&note.id).await.unwrap();
        let contents: Vec<_> = versions.iter().map(|v| v.note.content.as_str()).collect();
        assert_eq!(contents, vec!["rev-2", "rev-3", "rev-4", "rev-5", "rev-6"]);
    }

    #[tokio::test]
    async fn test_late_capture_is_slotted_by_capture_time() {
        let history = setup();
        let mut note = Note::new("t", "").with_id("n1");
        for (content, captured_at) in [("first", 10), ("third", 30), ("second", 20)] {
            note.content = content.to_string();
            history.save_version_at(&note, captured_at).await;
        }

        let versions = history.list_versions(&note.id).await.unwrap();
        let contents: Vec<_> = versions.iter().map(|v| v.note.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_restore_version_by_index() {
        let history = setup();
        let mut note = Note::new("t", "first").with_id("n1");
        history.save_version(&note).await;
        note.content = "second".to_string();
        history.save_version(&note).await;

        let restored = history.restore_version(&note.id, 0).await.unwrap().unwrap();
        assert_eq!(restored.content, "first");
        assert!(history.restore_version(&note.id, 5).await.unwrap().is_none());
        assert!(history
            .restore_version(&NoteId::from("missing"), 0)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_histories_are_per_note() {
        let history = setup();
        history.save_version(&Note::new("a", "").with_id("a")).await;
        history.save_version(&Note::new("b", "").with_id("b")).await;

        history.remove_history(&NoteId::from("a")).await.unwrap();
        assert!(history.list_versions(&NoteId::from("a")).await.unwrap().is_empty());
        assert_eq!(history.list_versions(&NoteId::from("b")).await.unwrap().len(), 1);
    }

    struct BrokenArea;

    #[async_trait]
    impl StorageArea for BrokenArea {
        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: Value) -> Result<()> {
            Err(Error::Storage("disk on fire".to_string()))
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        async fn bytes_in_use(&self) -> Result<u64> {
            Ok(0)
        }

        fn quota_bytes(&self) -> Option<u64> {
            None
        }

        fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
            broadcast::channel(1).1
        }
    }

    #[tokio::test]
    async fn test_save_failure_is_swallowed() {
        let history = VersionHistory::new(Arc::new(BrokenArea), &ProtectionConfig::default());
        history.save_version(&Note::new("t", "c")).await;
        assert!(history.list_versions(&NoteId::from("x")).await.unwrap().is_empty());
    }
}
