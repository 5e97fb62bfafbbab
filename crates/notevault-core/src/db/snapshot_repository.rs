//! Snapshot repository implementation

use crate::error::{Error, Result};
use crate::models::StorageSchema;
use crate::util::now_ms;
use libsql::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What produced a durable snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Recurring sync from the primary document
    Auto,
    /// Explicit user request
    Manual,
}

impl SnapshotKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(Error::Database(format!("unknown snapshot type '{other}'"))),
        }
    }
}

/// A full copy of the primary document in the durable tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableSnapshot {
    pub id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    /// Serialized document, kept raw so a damaged row can still be inspected
    pub data: String,
    pub notes_count: usize,
    pub version: u32,
}

impl DurableSnapshot {
    pub fn capture(schema: &StorageSchema, kind: SnapshotKind) -> Result<Self> {
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            timestamp: now_ms(),
            kind,
            data: serde_json::to_string(schema)?,
            notes_count: schema.notes.len(),
            version: schema.version,
        })
    }
}

/// Snapshot metadata without the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    pub notes_count: usize,
    pub version: u32,
}

/// Trait for durable snapshot storage (async)
#[allow(async_fn_in_trait)]
pub trait SnapshotRepository {
    /// Store a snapshot
    async fn insert(&self, snapshot: &DurableSnapshot) -> Result<()>;

    /// All snapshots, newest first
    async fn list(&self) -> Result<Vec<SnapshotSummary>>;

    /// Get a snapshot by ID
    async fn get(&self, id: &str) -> Result<Option<DurableSnapshot>>;

    /// The newest snapshot
    async fn latest(&self) -> Result<Option<DurableSnapshot>>;

    /// Delete all but the newest `keep` snapshots, returning how many went
    async fn prune(&self, keep: usize) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}

/// libSQL implementation of `SnapshotRepository`
pub struct LibSqlSnapshotRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSnapshotRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_summary(row: &Row) -> Result<SnapshotSummary> {
        Ok(SnapshotSummary {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            kind: SnapshotKind::parse(&row.get::<String>(2)?)?,
            notes_count: to_usize(row.get::<i64>(3)?),
            version: u32::try_from(row.get::<i64>(4)?).unwrap_or_default(),
        })
    }

    fn parse_snapshot(row: &Row) -> Result<DurableSnapshot> {
        let summary = Self::parse_summary(row)?;
        Ok(DurableSnapshot {
            id: summary.id,
            timestamp: summary.timestamp,
            kind: summary.kind,
            data: row.get(5)?,
            notes_count: summary.notes_count,
            version: summary.version,
        })
    }

    async fn query_one(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Option<DurableSnapshot>> {
        let mut rows = self.conn.query(sql, params).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_snapshot(&row)?)),
            None => Ok(None),
        }
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or_default()
}

const SNAPSHOT_COLUMNS: &str = "id, timestamp, type, notes_count, version, data";

impl SnapshotRepository for LibSqlSnapshotRepository<'_> {
    async fn insert(&self, snapshot: &DurableSnapshot) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO snapshots (id, timestamp, type, data, notes_count, version) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    snapshot.id.as_str(),
                    snapshot.timestamp,
                    snapshot.kind.as_str(),
                    snapshot.data.as_str(),
                    to_i64(snapshot.notes_count),
                    i64::from(snapshot.version)
                ],
            )
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SnapshotSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, timestamp, type, notes_count, version FROM snapshots ORDER BY timestamp DESC, id DESC",
                (),
            )
            .await?;

        let mut summaries = Vec::new();
        while let Some(row) = rows.next().await? {
            summaries.push(Self::parse_summary(&row)?);
        }
        Ok(summaries)
    }

    async fn get(&self, id: &str) -> Result<Option<DurableSnapshot>> {
        self.query_one(
            &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?"),
            [id],
        )
        .await
    }

    async fn latest(&self) -> Result<Option<DurableSnapshot>> {
        self.query_one(
            &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots ORDER BY timestamp DESC, id DESC LIMIT 1"),
            (),
        )
        .await
    }

    async fn prune(&self, keep: usize) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM snapshots WHERE id NOT IN (
                    SELECT id FROM snapshots ORDER BY timestamp DESC, id DESC LIMIT ?
                )",
                params![to_i64(keep)],
            )
            .await?;
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM snapshots", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(to_usize(row.get::<i64>(0)?)),
            None => Ok(0),
        }
    }
}
