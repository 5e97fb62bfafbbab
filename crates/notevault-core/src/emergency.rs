//! Emergency copy of the primary document in the session area.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::integrity::validate_schema_shape;
use crate::lock::WriteLock;
use crate::models::StorageSchema;
use crate::storage::{StorageArea, EMERGENCY_EXPORT_KEY, PRIMARY_DOCUMENT_KEY};
use crate::store;
use crate::util::now_ms;

/// What the session area holds under `emergency-export`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMirror {
    pub timestamp: i64,
    pub data: Value,
}

#[derive(Clone)]
pub struct EmergencyExport {
    primary: Arc<dyn StorageArea>,
    session: Arc<dyn StorageArea>,
    lock: Arc<WriteLock>,
}

impl EmergencyExport {
    pub fn new(
        primary: Arc<dyn StorageArea>,
        session: Arc<dyn StorageArea>,
        lock: Arc<WriteLock>,
    ) -> Self {
        Self {
            primary,
            session,
            lock,
        }
    }

    /// Copy the primary document into the session area.
    ///
    /// Returns the export timestamp, or `None` when there was nothing sound
    /// to copy. A malformed primary never replaces an earlier good mirror.
    pub async fn export_to_session_mirror(&self) -> Result<Option<i64>> {
        let Some(data) = self.primary.get(PRIMARY_DOCUMENT_KEY).await? else {
            return Ok(None);
        };
        let problems = validate_schema_shape(&data);
        if !problems.is_empty() {
            tracing::warn!("Skipping emergency export of malformed primary document: {problems:?}");
            return Ok(None);
        }

        let mirror = SessionMirror {
            timestamp: now_ms(),
            data,
        };
        self.session
            .set(EMERGENCY_EXPORT_KEY, serde_json::to_value(&mirror)?)
            .await?;
        tracing::debug!("Wrote emergency export at {}", mirror.timestamp);
        Ok(Some(mirror.timestamp))
    }

    pub async fn latest_export(&self) -> Result<Option<SessionMirror>> {
        match self.session.get(EMERGENCY_EXPORT_KEY).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|error| Error::InvalidPayload(vec![format!("emergency export: {error}")])),
            None => Ok(None),
        }
    }

    /// Overwrite the primary document with the mirror, after re-validating it.
    pub async fn restore_from_session_mirror(&self) -> Result<StorageSchema> {
        let mirror = self
            .latest_export()
            .await?
            .ok_or_else(|| Error::NotFound("no emergency export in session area".to_string()))?;
        let schema = store::parse_restore_payload(mirror.data)?;
        store::replace_document(self.primary.as_ref(), &self.lock, &schema).await?;
        tracing::info!(
            "Restored primary document from emergency export taken at {} ({} notes)",
            mirror.timestamp,
            schema.notes.len()
        );
        Ok(schema)
    }
}
