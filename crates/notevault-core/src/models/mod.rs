//! Data models for notevault

mod folder;
mod note;
mod records;
mod schema;
mod settings;

pub use folder::{Folder, FolderId, FolderPatch};
pub use note::{Note, NoteId, NotePatch};
pub use records::{
    ArchiveMetadata, BackupSnapshot, StorageStats, TrashListing, Trashed, VersionSnapshot,
};
pub use schema::{display_order, StorageSchema, SCHEMA_VERSION};
pub use settings::{Settings, ThemeMode};
