//! Quota-pressure reclaimer.
//!
//! Frees capacity for the primary document by deleting recovery data, least
//! user-visible first. Destructive and unconfirmed: losing old backups is
//! preferred over being unable to save a note.

use std::sync::Arc;

use crate::storage::{
    StorageArea, BACKUP_RING_KEY, TRASH_FOLDERS_KEY, TRASH_NOTES_KEY, VERSION_HISTORY_KEY,
};

/// Keys deleted by [`Reclaimer::reclaim`], in order.
pub const RECLAIM_ORDER: [&str; 4] = [
    BACKUP_RING_KEY,
    VERSION_HISTORY_KEY,
    TRASH_NOTES_KEY,
    TRASH_FOLDERS_KEY,
];

/// Outcome of one reclaim pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub cleared: Vec<&'static str>,
    pub failed: Vec<&'static str>,
    pub bytes_before: Option<u64>,
    pub bytes_after: Option<u64>,
}

impl ReclaimReport {
    pub fn freed_bytes(&self) -> Option<u64> {
        Some(self.bytes_before?.saturating_sub(self.bytes_after?))
    }
}

#[derive(Clone)]
pub struct Reclaimer {
    area: Arc<dyn StorageArea>,
}

impl Reclaimer {
    pub fn new(area: Arc<dyn StorageArea>) -> Self {
        Self { area }
    }

    /// Delete backups, then version history, then both trash collections.
    ///
    /// Each step runs even if an earlier one failed.
    pub async fn reclaim(&self) -> ReclaimReport {
        let mut report = ReclaimReport {
            bytes_before: self.area.bytes_in_use().await.ok(),
            ..ReclaimReport::default()
        };

        for key in RECLAIM_ORDER {
            match self.area.remove(key).await {
                Ok(()) => report.cleared.push(key),
                Err(error) => {
                    tracing::warn!("Reclaim could not clear {key}: {error}");
                    report.failed.push(key);
                }
            }
        }

        report.bytes_after = self.area.bytes_in_use().await.ok();
        tracing::warn!(
            "Reclaimed storage under quota pressure: cleared {:?}, freed {:?} bytes",
            report.cleared,
            report.freed_bytes()
        );
        report
    }
}
