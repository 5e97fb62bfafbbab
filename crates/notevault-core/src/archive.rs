//! Folder archives: a folder's notes moved out of the primary document into a
//! JSON file, with a metadata record left behind in `archive-metadata`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{ArchiveMetadata, Folder, FolderId, Note, NoteId};
use crate::storage::{self, ARCHIVE_METADATA_KEY};
use crate::store::PrimaryStore;
use crate::util::now_ms;

type MetadataMap = BTreeMap<FolderId, ArchiveMetadata>;

/// Contents of an archive file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderArchive {
    pub folder: Folder,
    pub notes: Vec<Note>,
    pub archived_at: i64,
}

/// Render an archive as pretty-printed JSON.
pub fn render_archive(archive: &FolderArchive) -> serde_json::Result<String> {
    serde_json::to_string_pretty(archive)
}

/// Build a deterministic file name for an archive.
#[must_use]
pub fn suggested_archive_file_name(folder_id: &FolderId, timestamp_ms: i64) -> String {
    format!("notevault-archive-{folder_id}-{timestamp_ms}.json")
}

#[derive(Clone)]
pub struct FolderArchiver {
    store: PrimaryStore,
}

impl FolderArchiver {
    pub const fn new(store: PrimaryStore) -> Self {
        Self { store }
    }

    async fn load_metadata(&self) -> Result<MetadataMap> {
        Ok(storage::read_json(self.store.area().as_ref(), ARCHIVE_METADATA_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn save_metadata(&self, metadata: &MetadataMap) -> Result<()> {
        storage::write_json(self.store.area().as_ref(), ARCHIVE_METADATA_KEY, metadata).await
    }

    /// Archived folders, oldest archive first.
    pub async fn list_archives(&self) -> Result<Vec<ArchiveMetadata>> {
        let mut archives: Vec<_> = self.load_metadata().await?.into_values().collect();
        archives.sort_by_key(|archive| archive.archived_at);
        Ok(archives)
    }

    /// Write the folder's notes to a file in `dir`, record the archive, then
    /// drop the notes from the primary document and flag the folder as
    /// archived.
    ///
    /// Runs entirely under the write lock. The record is saved before the
    /// notes leave the document and withdrawn again if that write fails, so
    /// archived notes always stay reachable.
    pub async fn archive_folder(&self, folder_id: &FolderId, dir: &Path) -> Result<ArchiveMetadata> {
        self.store
            .lock()
            .acquire(|| async move {
                let mut metadata = self.load_metadata().await?;
                if metadata.contains_key(folder_id) {
                    return Err(Error::InvalidInput(format!("folder {folder_id} is already archived")));
                }

                let mut schema = self.store.load_document().await?;
                let folder = schema
                    .folder(folder_id)
                    .cloned()
                    .ok_or_else(|| Error::NotFound(format!("folder {folder_id}")))?;
                let notes: Vec<Note> = schema
                    .notes
                    .iter()
                    .filter(|note| note.folder_id.as_ref() == Some(folder_id))
                    .cloned()
                    .collect();

                let archived_at = now_ms();
                let file_name = suggested_archive_file_name(folder_id, archived_at);
                let path = dir.join(&file_name);
                let archive = FolderArchive {
                    folder: folder.clone(),
                    notes,
                    archived_at,
                };
                tokio::fs::create_dir_all(dir).await?;
                tokio::fs::write(&path, render_archive(&archive)?).await?;

                let record = ArchiveMetadata {
                    folder_id: folder_id.clone(),
                    folder_name: folder.name,
                    file_name,
                    archived_at,
                    notes_count: archive.notes.len(),
                };
                metadata.insert(folder_id.clone(), record.clone());
                if let Err(error) = self.save_metadata(&metadata).await {
                    if let Err(remove_error) = tokio::fs::remove_file(&path).await {
                        tracing::warn!("Could not remove unrecorded archive {}: {remove_error}", path.display());
                    }
                    return Err(error);
                }

                let archived_ids: BTreeSet<NoteId> =
                    archive.notes.iter().map(|note| note.id.clone()).collect();
                schema.notes.retain(|note| !archived_ids.contains(&note.id));
                if let Some(folder) = schema.folder_mut(folder_id) {
                    folder.is_archived = true;
                    folder.archived_at = Some(archived_at);
                }
                if schema
                    .current_note_id
                    .as_ref()
                    .is_some_and(|id| archived_ids.contains(id))
                {
                    schema.current_note_id = None;
                }

                if let Err(error) = self.store.persist(&schema).await {
                    metadata.remove(folder_id);
                    if let Err(withdraw_error) = self.save_metadata(&metadata).await {
                        tracing::error!("Archive of folder {folder_id} failed and its record could not be withdrawn: {withdraw_error}");
                    }
                    return Err(error);
                }

                tracing::info!(
                    "Archived folder {folder_id} with {} notes to {}",
                    record.notes_count,
                    record.file_name
                );
                Ok(record)
            })
            .await
    }

    /// Bring an archived folder's notes back from its file in `dir`.
    ///
    /// The file is left in place. Returns how many notes were re-inserted.
    pub async fn unarchive_folder(&self, folder_id: &FolderId, dir: &Path) -> Result<usize> {
        self.store
            .lock()
            .acquire(|| async move {
                let mut metadata = self.load_metadata().await?;
                let record = metadata
                    .get(folder_id)
                    .cloned()
                    .ok_or_else(|| Error::NotFound(format!("archive of folder {folder_id}")))?;

                let raw = tokio::fs::read_to_string(dir.join(&record.file_name)).await?;
                let archive: FolderArchive = serde_json::from_str(&raw)?;
                let restored = archive.notes.len();

                let mut schema = self.store.load_document().await?;
                match schema.folder_mut(folder_id) {
                    Some(folder) => {
                        folder.is_archived = false;
                        folder.archived_at = None;
                    }
                    None => {
                        let mut folder = archive.folder;
                        folder.is_archived = false;
                        folder.archived_at = None;
                        schema.folders.push(folder);
                    }
                }
                for note in archive.notes {
                    match schema.note_mut(&note.id) {
                        Some(existing) => *existing = note,
                        None => schema.notes.push(note),
                    }
                }
                self.store.persist(&schema).await?;

                metadata.remove(folder_id);
                self.save_metadata(&metadata).await?;
                tracing::info!("Unarchived folder {folder_id} ({restored} notes)");
                Ok(restored)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtectionConfig;
    use crate::lock::WriteLock;
    use crate::storage::{MemoryStorageArea, StorageArea, StorageChange};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio::sync::broadcast;

    /// Memory area that refuses every write of the archive records.
    struct FullMetadataArea {
        inner: MemoryStorageArea,
    }

    #[async_trait]
    impl StorageArea for FullMetadataArea {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<()> {
            if key == ARCHIVE_METADATA_KEY {
                return Err(Error::QuotaExceeded("archive metadata".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }

        async fn bytes_in_use(&self) -> Result<u64> {
            self.inner.bytes_in_use().await
        }

        fn quota_bytes(&self) -> Option<u64> {
            self.inner.quota_bytes()
        }

        fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
            self.inner.subscribe()
        }
    }

    async fn setup() -> (PrimaryStore, FolderArchiver) {
        setup_over(Arc::new(MemoryStorageArea::unbounded())).await
    }

    async fn setup_over(area: Arc<dyn StorageArea>) -> (PrimaryStore, FolderArchiver) {
        let store = PrimaryStore::new(area, Arc::new(WriteLock::new()), &ProtectionConfig::default());
        store.initialize().await.unwrap();
        let folder = store.create_folder(Folder::new("Projects").with_id("p")).await.unwrap();
        for title in ["one", "two"] {
            store
                .create(Note::new(title, "").with_id(title).in_folder(folder.id.clone()))
                .await
                .unwrap();
        }
        store.create(Note::new("loose", "").with_id("loose")).await.unwrap();
        (store.clone(), FolderArchiver::new(store))
    }

    #[test]
    fn test_file_name_is_deterministic() {
        assert_eq!(
            suggested_archive_file_name(&FolderId::from("p"), 123),
            "notevault-archive-p-123.json"
        );
    }

    #[tokio::test]
    async fn test_archive_and_unarchive_round_trip() {
        let (store, archiver) = setup().await;
        let dir = tempdir().unwrap();
        let folder_id = FolderId::from("p");

        let record = archiver.archive_folder(&folder_id, dir.path()).await.unwrap();
        assert_eq!(record.folder_name, "Projects");
        assert_eq!(record.notes_count, 2);
        assert!(dir.path().join(&record.file_name).exists());

        let titles: Vec<_> = store.get_all().await.unwrap().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["loose"]);
        assert!(store.get_folder(&folder_id).await.unwrap().unwrap().is_archived);
        assert_eq!(archiver.list_archives().await.unwrap(), vec![record]);

        assert!(matches!(
            archiver.archive_folder(&folder_id, dir.path()).await,
            Err(Error::InvalidInput(_))
        ));

        assert_eq!(archiver.unarchive_folder(&folder_id, dir.path()).await.unwrap(), 2);
        assert_eq!(store.get_all().await.unwrap().len(), 3);
        let folder = store.get_folder(&folder_id).await.unwrap().unwrap();
        assert!(!folder.is_archived);
        assert_eq!(folder.archived_at, None);
        assert!(archiver.list_archives().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_folders() {
        let (_store, archiver) = setup().await;
        let dir = tempdir().unwrap();
        let missing = FolderId::from("missing");

        assert!(matches!(
            archiver.archive_folder(&missing, dir.path()).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            archiver.unarchive_folder(&missing, dir.path()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_record_write_leaves_notes_in_place() {
        let area = Arc::new(FullMetadataArea {
            inner: MemoryStorageArea::unbounded(),
        });
        let (store, archiver) = setup_over(area).await;
        let dir = tempdir().unwrap();
        let folder_id = FolderId::from("p");

        let error = archiver.archive_folder(&folder_id, dir.path()).await.unwrap_err();
        assert!(error.is_quota_exceeded());

        assert_eq!(store.get_all().await.unwrap().len(), 3);
        assert!(!store.get_folder(&folder_id).await.unwrap().unwrap().is_archived);
        assert!(archiver.list_archives().await.unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_archives_keep_both_records() {
        let (store, archiver) = setup().await;
        store.create_folder(Folder::new("Later").with_id("l")).await.unwrap();
        store
            .create(Note::new("three", "").with_id("three").in_folder(FolderId::from("l")))
            .await
            .unwrap();
        let dir = tempdir().unwrap();

        let folder_p = FolderId::from("p");
        let folder_l = FolderId::from("l");
        let (first, second) = tokio::join!(
            archiver.archive_folder(&folder_p, dir.path()),
            archiver.archive_folder(&folder_l, dir.path()),
        );
        first.unwrap();
        second.unwrap();

        let mut archived: Vec<_> = archiver
            .list_archives()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.folder_id.to_string())
            .collect();
        archived.sort();
        assert_eq!(archived, vec!["l", "p"]);
        let titles: Vec<_> = store.get_all().await.unwrap().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["loose"]);
    }
}
