//! Durable database behind the external persistence bridge

mod connection;
mod migrations;
mod snapshot_repository;

pub use connection::Database;
pub use snapshot_repository::{
    DurableSnapshot, LibSqlSnapshotRepository, SnapshotKind, SnapshotRepository, SnapshotSummary,
};
