//! Primary store accessor.
//!
//! [`PrimaryStore`] owns the primary document. Every mutation runs under the
//! shared [`WriteLock`], reads the whole document, changes a copy and writes
//! the whole document back, since one key's value is the substrate's only
//! unit of atomicity.
//!
//! Reads take no lock. A read that finds the document unreadable hands it to
//! the recovery chain (backup ring, then durable bridge) and falls back to an
//! empty document if both fail. Writes never recover: they already hold the
//! lock recovery needs, so they surface [`Error::Corrupted`] instead.

mod migrations;

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::config::ProtectionConfig;
use crate::error::{Error, Result};
use crate::integrity::validate_schema_shape;
use crate::lock::WriteLock;
use crate::models::{
    Folder, FolderId, FolderPatch, Note, NoteId, NotePatch, Settings, StorageSchema, StorageStats,
    SCHEMA_VERSION,
};
use crate::reclaim::Reclaimer;
use crate::services::RecoveryChain;
use crate::storage::{
    self, StorageArea, PRIMARY_DOCUMENT_KEY, TRASH_FOLDERS_KEY, TRASH_NOTES_KEY,
};
use crate::trash::TrashManager;
use crate::util::{now_ms, percent_of};
use crate::versions::VersionHistory;

/// Parse a raw stored document, migrating it in memory if it is older.
pub(crate) fn parse_document(value: Value) -> Result<StorageSchema> {
    let (migrated, _) = migrations::run(value)?;
    serde_json::from_value(migrated).map_err(|error| Error::Corrupted(error.to_string()))
}

/// Decode a document offered for restore: shape check first, then parse.
pub(crate) fn parse_restore_payload(value: Value) -> Result<StorageSchema> {
    let problems = validate_schema_shape(&value);
    if !problems.is_empty() {
        return Err(Error::InvalidPayload(problems));
    }
    parse_document(value).map_err(|error| match error {
        Error::Corrupted(reason) => Error::InvalidPayload(vec![reason]),
        other => other,
    })
}

/// Write the whole primary document. Callers hold the write lock.
pub(crate) async fn write_document(area: &dyn StorageArea, schema: &StorageSchema) -> Result<()> {
    storage::write_json(area, PRIMARY_DOCUMENT_KEY, schema).await
}

/// Replace the whole primary document under the write lock.
pub(crate) async fn replace_document(
    area: &dyn StorageArea,
    lock: &WriteLock,
    schema: &StorageSchema,
) -> Result<()> {
    lock.acquire(|| write_document(area, schema)).await
}

/// Typed CRUD over the primary document.
#[derive(Clone)]
pub struct PrimaryStore {
    area: Arc<dyn StorageArea>,
    lock: Arc<WriteLock>,
    trash: TrashManager,
    versions: VersionHistory,
    reclaimer: Reclaimer,
    recovery: Option<Arc<RecoveryChain>>,
}

impl PrimaryStore {
    pub fn new(area: Arc<dyn StorageArea>, lock: Arc<WriteLock>, config: &ProtectionConfig) -> Self {
        Self {
            trash: TrashManager::new(Arc::clone(&area), config),
            versions: VersionHistory::new(Arc::clone(&area), config),
            reclaimer: Reclaimer::new(Arc::clone(&area)),
            area,
            lock,
            recovery: None,
        }
    }

    /// Attach the chain used when a read finds the document unreadable.
    #[must_use]
    pub fn with_recovery(mut self, recovery: Arc<RecoveryChain>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub const fn trash(&self) -> &TrashManager {
        &self.trash
    }

    pub const fn versions(&self) -> &VersionHistory {
        &self.versions
    }

    pub const fn lock(&self) -> &Arc<WriteLock> {
        &self.lock
    }

    pub const fn area(&self) -> &Arc<dyn StorageArea> {
        &self.area
    }

    /// Create the document if missing, or migrate it to the current version.
    pub async fn initialize(&self) -> Result<StorageSchema> {
        self.lock
            .acquire(|| async {
                let Some(value) = self.area.get(PRIMARY_DOCUMENT_KEY).await? else {
                    let schema = StorageSchema::default();
                    self.persist(&schema).await?;
                    tracing::info!("Created primary document at version {SCHEMA_VERSION}");
                    return Ok(schema);
                };

                let (migrated, changed) = migrations::run(value)?;
                let schema: StorageSchema = serde_json::from_value(migrated)
                    .map_err(|error| Error::Corrupted(error.to_string()))?;
                if changed {
                    self.persist(&schema).await?;
                }
                Ok(schema)
            })
            .await
    }

    /// Read the document as stored, without recovery. Absent means empty.
    pub async fn load_document(&self) -> Result<StorageSchema> {
        match self.area.get(PRIMARY_DOCUMENT_KEY).await? {
            Some(value) => parse_document(value),
            None => Ok(StorageSchema::default()),
        }
    }

    /// Read path: recover an unreadable document, or fall back to empty.
    async fn read_document(&self) -> Result<StorageSchema> {
        match self.load_document().await {
            Err(Error::Corrupted(reason)) => {
                tracing::error!("Primary document is unreadable: {reason}");
                if let Some(recovery) = &self.recovery {
                    match recovery.recover().await {
                        Ok(source) => {
                            tracing::info!("Primary document recovered from {source:?}");
                            if let Ok(schema) = self.load_document().await {
                                return Ok(schema);
                            }
                        }
                        Err(error) => tracing::error!("Recovery failed: {error}"),
                    }
                }
                Ok(StorageSchema::default())
            }
            other => other,
        }
    }

    /// Run one write, and on quota exhaustion reclaim space and retry once.
    async fn with_reclaim_retry<R, F, Fut>(&self, what: &str, write: F) -> Result<R>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        match write().await {
            Err(error) if error.is_quota_exceeded() => {
                tracing::warn!("Writing {what} hit the storage quota ({error}); reclaiming and retrying once");
                self.reclaimer.reclaim().await;
                let retried = write().await;
                if let Err(retry_error) = &retried {
                    tracing::error!("Writing {what} failed again after reclaim: {retry_error}");
                }
                retried
            }
            other => other,
        }
    }

    /// Write the whole document. Callers hold the write lock.
    ///
    /// Returns whether the write needed a reclaim pass to fit.
    pub(crate) async fn persist(&self, schema: &StorageSchema) -> Result<bool> {
        let value = serde_json::to_value(schema)?;
        let attempts = AtomicU8::new(0);
        self.with_reclaim_retry(PRIMARY_DOCUMENT_KEY, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.area.set(PRIMARY_DOCUMENT_KEY, value.clone())
        })
        .await?;
        Ok(attempts.into_inner() > 1)
    }

    /// Read-modify-write under the lock; always writes.
    pub(crate) async fn mutate<T, F>(&self, mutation: F) -> Result<T>
    where
        F: FnOnce(&mut StorageSchema) -> Result<T> + Send,
        T: Send,
    {
        self.lock
            .acquire(|| async move {
                let mut schema = self.load_document().await?;
                let output = mutation(&mut schema)?;
                self.persist(&schema).await?;
                Ok(output)
            })
            .await
    }

    /// Read-modify-write under the lock; skips the write when the mutation
    /// returns `None`.
    pub(crate) async fn mutate_if<T, F>(&self, mutation: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut StorageSchema) -> Result<Option<T>> + Send,
        T: Send,
    {
        self.lock
            .acquire(|| async move {
                let mut schema = self.load_document().await?;
                let Some(output) = mutation(&mut schema)? else {
                    return Ok(None);
                };
                self.persist(&schema).await?;
                Ok(Some(output))
            })
            .await
    }

    /// Record `note`, as it was at `captured_at`, in version history without
    /// waiting for it.
    fn capture_version(&self, note: Note, captured_at: i64) {
        let versions = self.versions.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    versions.save_version_at(&note, captured_at).await;
                });
            }
            Err(_) => tracing::warn!("No async runtime; skipped version capture of note {}", note.id),
        }
    }

    // --- notes ---

    /// All notes in display order.
    pub async fn get_all(&self) -> Result<Vec<Note>> {
        Ok(self.read_document().await?.sorted_notes())
    }

    pub async fn get_by_id(&self, id: &NoteId) -> Result<Option<Note>> {
        Ok(self.read_document().await?.note(id).cloned())
    }

    /// Insert a new note. Fails if the id is already taken.
    pub async fn create(&self, mut note: Note) -> Result<Note> {
        note.updated_at = note.updated_at.max(note.created_at);
        self.mutate(move |schema| {
            if schema.note(&note.id).is_some() {
                return Err(Error::InvalidInput(format!("note {} already exists", note.id)));
            }
            schema.notes.push(note.clone());
            Ok(note)
        })
        .await
    }

    /// Merge `patch` over an existing note and bump `updatedAt`.
    ///
    /// Returns `None` for unknown ids. The pre-update note is handed to
    /// version history in the background.
    pub async fn update(&self, id: &NoteId, patch: NotePatch) -> Result<Option<Note>> {
        let outcome = self
            .mutate_if(move |schema| {
                let Some(note) = schema.note_mut(id) else {
                    return Ok(None);
                };
                let previous = note.clone();
                let edited_at = now_ms();
                note.apply(patch);
                note.updated_at = edited_at.max(note.created_at);
                Ok(Some((previous, note.clone(), edited_at)))
            })
            .await?;

        Ok(outcome.map(|(previous, updated, edited_at)| {
            self.capture_version(previous, edited_at);
            updated
        }))
    }

    /// Soft-delete a note into the trash. Returns whether it existed.
    ///
    /// The trash entry is written before the note leaves the document, so a
    /// failure in between leaves a duplicate rather than a loss. If the
    /// document write then needs a reclaim pass, that pass empties the trash
    /// too: the delete succeeds but the note can no longer be restored.
    pub async fn delete(&self, id: &NoteId) -> Result<bool> {
        self.lock
            .acquire(|| async move {
                let mut schema = self.load_document().await?;
                let Some(position) = schema.notes.iter().position(|note| &note.id == id) else {
                    return Ok(false);
                };
                let note = schema.notes.remove(position);
                self.with_reclaim_retry(TRASH_NOTES_KEY, || {
                    self.trash.move_to_trash(note.clone())
                })
                .await?;

                if schema.current_note_id.as_ref() == Some(id) {
                    schema.current_note_id = None;
                }
                if self.persist(&schema).await? {
                    tracing::warn!("Note {id} deleted under quota pressure; reclaim emptied the trash, so it cannot be restored");
                }
                Ok(true)
            })
            .await
    }

    /// Re-insert a note, replacing any note with the same id.
    ///
    /// A note whose folder no longer exists lands at the root.
    pub async fn restore(&self, mut note: Note) -> Result<Note> {
        self.mutate(move |schema| {
            if let Some(folder_id) = &note.folder_id {
                if schema.folder(folder_id).is_none() {
                    tracing::debug!("Folder {folder_id} is gone; restoring note {} to root", note.id);
                    note.folder_id = None;
                }
            }
            match schema.note_mut(&note.id) {
                Some(existing) => *existing = note.clone(),
                None => schema.notes.push(note.clone()),
            }
            Ok(note)
        })
        .await
    }

    /// Move a note from the trash back into the document.
    pub async fn restore_note_from_trash(&self, id: &NoteId) -> Result<Option<Note>> {
        let Some(note) = self.trash.restore_from_trash::<Note>(id.as_str()).await? else {
            return Ok(None);
        };
        match self.restore(note.clone()).await {
            Ok(restored) => Ok(Some(restored)),
            Err(error) => {
                if let Err(retrash_error) = self.trash.move_to_trash(note).await {
                    tracing::error!("Note {id} left trash but could not be restored or re-trashed: {retrash_error}");
                }
                Err(error)
            }
        }
    }

    /// Drop a trashed note and its version history for good.
    pub async fn delete_permanently(&self, id: &NoteId) -> Result<bool> {
        let found = self.trash.permanently_delete::<Note>(id.as_str()).await?;
        self.versions.remove_history(id).await?;
        Ok(found)
    }

    /// Roll a note's editable fields back to revision `index`.
    pub async fn restore_note_version(&self, id: &NoteId, index: usize) -> Result<Option<Note>> {
        let Some(version) = self.versions.restore_version(id, index).await? else {
            return Ok(None);
        };
        let patch = NotePatch {
            title: Some(version.title),
            content: Some(version.content),
            color: Some(version.color),
            tags: Some(version.tags),
            ..NotePatch::default()
        };
        self.update(id, patch).await
    }

    // --- folders ---

    /// All folders in display order.
    pub async fn get_all_folders(&self) -> Result<Vec<Folder>> {
        Ok(self.read_document().await?.sorted_folders())
    }

    pub async fn get_folder(&self, id: &FolderId) -> Result<Option<Folder>> {
        Ok(self.read_document().await?.folder(id).cloned())
    }

    pub async fn create_folder(&self, mut folder: Folder) -> Result<Folder> {
        folder.updated_at = folder.updated_at.max(folder.created_at);
        self.mutate(move |schema| {
            if schema.folder(&folder.id).is_some() {
                return Err(Error::InvalidInput(format!("folder {} already exists", folder.id)));
            }
            if let Some(parent_id) = &folder.parent_id {
                check_parent(schema, &folder.id, parent_id)?;
            }
            schema.folders.push(folder.clone());
            Ok(folder)
        })
        .await
    }

    /// Merge `patch` over a folder. Re-parenting may not form a cycle.
    pub async fn update_folder(&self, id: &FolderId, patch: FolderPatch) -> Result<Option<Folder>> {
        self.mutate_if(move |schema| {
            if schema.folder(id).is_none() {
                return Ok(None);
            }
            if let Some(Some(parent_id)) = &patch.parent_id {
                check_parent(schema, id, parent_id)?;
            }
            let Some(folder) = schema.folder_mut(id) else {
                return Ok(None);
            };
            folder.apply(patch);
            folder.updated_at = now_ms().max(folder.created_at);
            Ok(Some(folder.clone()))
        })
        .await
    }

    /// Soft-delete a folder. Child notes and folders are left as they are;
    /// reassigning or deleting them is the caller's decision. As with
    /// [`delete`](Self::delete), a reclaim pass during the document write
    /// leaves the folder unrestorable.
    pub async fn delete_folder(&self, id: &FolderId) -> Result<bool> {
        self.lock
            .acquire(|| async move {
                let mut schema = self.load_document().await?;
                let Some(position) = schema.folders.iter().position(|folder| &folder.id == id)
                else {
                    return Ok(false);
                };
                let folder = schema.folders.remove(position);
                self.with_reclaim_retry(TRASH_FOLDERS_KEY, || {
                    self.trash.move_to_trash(folder.clone())
                })
                .await?;

                if schema.current_folder_id.as_ref() == Some(id) {
                    schema.current_folder_id = None;
                }
                if self.persist(&schema).await? {
                    tracing::warn!("Folder {id} deleted under quota pressure; reclaim emptied the trash, so it cannot be restored");
                }
                Ok(true)
            })
            .await
    }

    /// Re-insert a folder; one whose parent is gone lands at the root.
    pub async fn restore_folder(&self, mut folder: Folder) -> Result<Folder> {
        self.mutate(move |schema| {
            if let Some(parent_id) = &folder.parent_id {
                if schema.folder(parent_id).is_none() || schema.would_cycle(&folder.id, parent_id) {
                    folder.parent_id = None;
                }
            }
            match schema.folder_mut(&folder.id) {
                Some(existing) => *existing = folder.clone(),
                None => schema.folders.push(folder.clone()),
            }
            Ok(folder)
        })
        .await
    }

    pub async fn restore_folder_from_trash(&self, id: &FolderId) -> Result<Option<Folder>> {
        let Some(folder) = self.trash.restore_from_trash::<Folder>(id.as_str()).await? else {
            return Ok(None);
        };
        match self.restore_folder(folder.clone()).await {
            Ok(restored) => Ok(Some(restored)),
            Err(error) => {
                if let Err(retrash_error) = self.trash.move_to_trash(folder).await {
                    tracing::error!("Folder {id} left trash but could not be restored or re-trashed: {retrash_error}");
                }
                Err(error)
            }
        }
    }

    // --- settings and focus ---

    pub async fn get_settings(&self) -> Result<Settings> {
        Ok(self.read_document().await?.settings)
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<Settings> {
        self.mutate(move |schema| {
            schema.settings = settings.clone();
            Ok(settings)
        })
        .await
    }

    pub async fn set_current_note(&self, id: Option<NoteId>) -> Result<()> {
        self.mutate(move |schema| {
            schema.current_note_id = id;
            Ok(())
        })
        .await
    }

    pub async fn set_current_folder(&self, id: Option<FolderId>) -> Result<()> {
        self.mutate(move |schema| {
            schema.current_folder_id = id;
            Ok(())
        })
        .await
    }

    /// Usage of the whole area plus entity counts.
    pub async fn get_storage_stats(&self) -> Result<StorageStats> {
        let schema = self.read_document().await?;
        let bytes_in_use = self.area.bytes_in_use().await?;
        let quota_bytes = self.area.quota_bytes();
        Ok(StorageStats {
            bytes_in_use,
            quota_bytes,
            percent_used: quota_bytes.map(|quota| percent_of(bytes_in_use, quota)),
            notes_count: schema.notes.len(),
            folders_count: schema.folders.len(),
        })
    }
}

fn check_parent(schema: &StorageSchema, id: &FolderId, parent_id: &FolderId) -> Result<()> {
    if parent_id == id {
        return Err(Error::InvalidInput(format!("folder {id} cannot contain itself")));
    }
    if schema.folder(parent_id).is_none() {
        return Err(Error::InvalidInput(format!("parent folder {parent_id} does not exist")));
    }
    if schema.would_cycle(id, parent_id) {
        return Err(Error::InvalidInput(format!(
            "moving folder {id} under {parent_id} would create a cycle"
        )));
    }
    Ok(())
}
