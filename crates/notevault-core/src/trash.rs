//! Soft-delete holding area.
//!
//! Deleted notes and folders are parked in their own collections, outside the
//! primary document, for the configured retention window. Expiry is lazy:
//! nothing deletes an entry the moment it expires. Listings hide expired
//! entries, and every mutating call drops them from the stored collection.
//!
//! The manager never writes the primary document itself; callers re-insert
//! whatever [`TrashManager::restore_from_trash`] hands back.
//!
//! Each collection is one stored value, so every read-modify-write holds the
//! manager's own lock. Callers that also hold the primary [`WriteLock`] take
//! it first; the trash lock is never held while waiting for the write lock.
//!
//! [`WriteLock`]: crate::lock::WriteLock

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::ProtectionConfig;
use crate::error::Result;
use crate::models::{Folder, Note, TrashListing, Trashed};
use crate::storage::{self, StorageArea, TRASH_FOLDERS_KEY, TRASH_NOTES_KEY};
use crate::util::{days_until, now_ms};

/// An entity that can be parked in the trash.
pub trait Trashable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Storage key of this entity's trash collection.
    const TRASH_KEY: &'static str;

    fn trash_id(&self) -> &str;
}

impl Trashable for Note {
    const TRASH_KEY: &'static str = TRASH_NOTES_KEY;

    fn trash_id(&self) -> &str {
        self.id.as_str()
    }
}

impl Trashable for Folder {
    const TRASH_KEY: &'static str = TRASH_FOLDERS_KEY;

    fn trash_id(&self) -> &str {
        self.id.as_str()
    }
}

/// Time-boxed soft-delete collections for notes and folders.
#[derive(Clone)]
pub struct TrashManager {
    area: Arc<dyn StorageArea>,
    retention_ms: i64,
    guard: Arc<Mutex<()>>,
}

impl TrashManager {
    pub fn new(area: Arc<dyn StorageArea>, config: &ProtectionConfig) -> Self {
        Self {
            area,
            retention_ms: config.trash_retention_ms(),
            guard: Arc::new(Mutex::new(())),
        }
    }

    async fn load<T: Trashable>(&self) -> Result<Vec<Trashed<T>>> {
        Ok(storage::read_json(self.area.as_ref(), T::TRASH_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn save<T: Trashable>(&self, entries: &[Trashed<T>]) -> Result<()> {
        storage::write_json(self.area.as_ref(), T::TRASH_KEY, entries).await
    }

    /// Park `item`, stamping its deletion time and restore deadline.
    ///
    /// The same write drops entries whose deadline has passed and replaces an
    /// older entry with the same id.
    pub async fn move_to_trash<T: Trashable>(&self, item: T) -> Result<Trashed<T>> {
        let _guard = self.guard.lock().await;
        let now = now_ms();
        let mut entries = self.load::<T>().await?;
        entries.retain(|entry| !entry.is_expired(now) && entry.item.trash_id() != item.trash_id());

        let entry = Trashed {
            item,
            deleted_at: now,
            can_restore_until: now + self.retention_ms,
        };
        entries.push(entry.clone());
        self.save(&entries).await?;

        tracing::debug!(
            "Moved {} to {} ({} entries)",
            entry.item.trash_id(),
            T::TRASH_KEY,
            entries.len()
        );
        Ok(entry)
    }

    /// Take an entry out of the trash, returning the bare entity.
    ///
    /// Expired entries are no longer restorable and yield `None`.
    pub async fn restore_from_trash<T: Trashable>(&self, id: &str) -> Result<Option<T>> {
        let _guard = self.guard.lock().await;
        let now = now_ms();
        let mut entries = self.load::<T>().await?;
        let before = entries.len();
        entries.retain(|entry| !entry.is_expired(now));

        let restored = entries
            .iter()
            .position(|entry| entry.item.trash_id() == id)
            .map(|position| entries.remove(position).item);

        if entries.len() != before {
            self.save(&entries).await?;
        }
        Ok(restored)
    }

    /// Restorable entries, most recently deleted first.
    pub async fn list<T: Trashable>(&self) -> Result<Vec<TrashListing<T>>> {
        let now = now_ms();
        let mut listings: Vec<TrashListing<T>> = self
            .load::<T>()
            .await?
            .into_iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| TrashListing {
                days_until_permanent_delete: days_until(entry.can_restore_until, now),
                entry,
            })
            .collect();
        listings.sort_by(|a, b| b.entry.deleted_at.cmp(&a.entry.deleted_at));
        Ok(listings)
    }

    /// Drop one entry for good. Returns whether it was present.
    pub async fn permanently_delete<T: Trashable>(&self, id: &str) -> Result<bool> {
        let _guard = self.guard.lock().await;
        let now = now_ms();
        let mut entries = self.load::<T>().await?;
        let before = entries.len();
        let found = entries.iter().any(|entry| entry.item.trash_id() == id);
        entries.retain(|entry| !entry.is_expired(now) && entry.item.trash_id() != id);
        if entries.len() != before {
            self.save(&entries).await?;
        }
        Ok(found)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired<T: Trashable>(&self) -> Result<usize> {
        let _guard = self.guard.lock().await;
        let now = now_ms();
        let mut entries = self.load::<T>().await?;
        let before = entries.len();
        entries.retain(|entry| !entry.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            self.save(&entries).await?;
            tracing::info!("Purged {purged} expired entries from {}", T::TRASH_KEY);
        }
        Ok(purged)
    }

    /// Empty one collection.
    pub async fn empty<T: Trashable>(&self) -> Result<()> {
        let _guard = self.guard.lock().await;
        self.area.remove(T::TRASH_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorageArea;
    use crate::util::DAY_MS;
    use pretty_assertions::assert_eq;

    fn setup() -> (Arc<MemoryStorageArea>, TrashManager) {
        let area = Arc::new(MemoryStorageArea::unbounded());
        let trash = TrashManager::new(area.clone(), &ProtectionConfig::default());
        (area, trash)
    }

    fn sample_note(id: &str) -> Note {
        let mut note = Note::new("Title", "<p>body</p>").with_id(id);
        note.tags = vec!["work".to_string()];
        note.color = Some("#ff0".to_string());
        note.order = Some(3.0);
        note
    }

    #[tokio::test]
    async fn test_trash_roundtrip_strips_metadata() {
        let (_, trash) = setup();
        let note = sample_note("n1");

        let entry = trash.move_to_trash(note.clone()).await.unwrap();
        assert_eq!(entry.can_restore_until - entry.deleted_at, 30 * DAY_MS);

        let restored: Note = trash.restore_from_trash("n1").await.unwrap().unwrap();
        assert_eq!(restored, note);
        assert!(trash.list::<Note>().await.unwrap().is_empty());
        assert!(trash.restore_from_trash::<Note>("n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_reports_days_left() {
        let (_, trash) = setup();
        trash.move_to_trash(sample_note("n1")).await.unwrap();

        let listings = trash.list::<Note>().await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].days_until_permanent_delete, 30);
    }

    #[tokio::test]
    async fn test_expired_entries_are_hidden_then_pruned() {
        let (area, trash) = setup();
        let now = now_ms();
        let expired = Trashed {
            item: sample_note("old"),
            deleted_at: now - 31 * DAY_MS,
            can_restore_until: now - DAY_MS,
        };
        storage::write_json(area.as_ref(), TRASH_NOTES_KEY, &vec![expired])
            .await
            .unwrap();

        assert!(trash.list::<Note>().await.unwrap().is_empty());
        assert!(trash.restore_from_trash::<Note>("old").await.unwrap().is_none());

        storage::write_json(
            area.as_ref(),
            TRASH_NOTES_KEY,
            &vec![Trashed {
                item: sample_note("old"),
                deleted_at: now - 31 * DAY_MS,
                can_restore_until: now - DAY_MS,
            }],
        )
        .await
        .unwrap();
        trash.move_to_trash(sample_note("fresh")).await.unwrap();

        let stored: Vec<Trashed<Note>> = storage::read_json(area.as_ref(), TRASH_NOTES_KEY)
            .await
            .unwrap()
            .unwrap();
        let ids: Vec<_> = stored.iter().map(|entry| entry.item.id.to_string()).collect();
        assert_eq!(ids, vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_notes_and_folders_use_separate_collections() {
        let (area, trash) = setup();
        trash.move_to_trash(sample_note("same")).await.unwrap();
        trash
            .move_to_trash(Folder::new("Work").with_id("same"))
            .await
            .unwrap();

        assert_eq!(trash.list::<Note>().await.unwrap().len(), 1);
        assert_eq!(trash.list::<Folder>().await.unwrap().len(), 1);
        assert!(area.get(TRASH_FOLDERS_KEY).await.unwrap().is_some());

        let folder: Folder = trash.restore_from_trash("same").await.unwrap().unwrap();
        assert_eq!(folder.name, "Work");
        assert_eq!(trash.list::<Note>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_delete_and_empty() {
        let (_, trash) = setup();
        trash.move_to_trash(sample_note("a")).await.unwrap();
        trash.move_to_trash(sample_note("b")).await.unwrap();

        assert!(trash.permanently_delete::<Note>("a").await.unwrap());
        assert!(!trash.permanently_delete::<Note>("a").await.unwrap());
        assert_eq!(trash.list::<Note>().await.unwrap().len(), 1);

        trash.empty::<Note>().await.unwrap();
        assert!(trash.list::<Note>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrashing_replaces_previous_entry() {
        let (_, trash) = setup();
        trash.move_to_trash(sample_note("a")).await.unwrap();
        let mut changed = sample_note("a");
        changed.title = "Second".to_string();
        trash.move_to_trash(changed).await.unwrap();

        let listings = trash.list::<Note>().await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].entry.item.title, "Second");
    }
}
