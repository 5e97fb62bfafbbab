//! notevault-core - data protection core for notevault
//!
//! Keeps a single primary document of notes, folders and settings in a
//! quota-limited key-value area, and layers recovery tiers around it: trash,
//! per-note version history, an in-area backup ring, a durable libSQL
//! snapshot store, and an emergency session mirror.

pub mod archive;
pub mod backup;
pub mod bridge;
pub mod config;
pub mod db;
pub mod emergency;
pub mod error;
pub mod integrity;
pub mod lock;
pub mod models;
pub mod reclaim;
pub mod services;
pub mod storage;
pub mod store;
pub mod trash;
pub mod util;
pub mod versions;

pub use config::ProtectionConfig;
pub use error::{Error, Result};
pub use models::{Folder, FolderId, Note, NoteId, StorageSchema};
pub use services::DataGuard;
pub use storage::{JsonFileStorageArea, MemoryStorageArea, StorageArea};
pub use store::PrimaryStore;
