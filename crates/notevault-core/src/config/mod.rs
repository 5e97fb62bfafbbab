//! Data-protection configuration.
//!
//! Provides `ProtectionConfig`, the set of retention depths, ring sizes,
//! timer intervals and quota thresholds shared by every protection tier.
//! Hosts may ship a JSON override; unspecified fields keep their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_TRASH_RETENTION_DAYS: u32 = 30;
const DEFAULT_BACKUP_RING_SIZE: usize = 3;
const DEFAULT_EXTERNAL_RING_SIZE: usize = 20;
const DEFAULT_VERSION_HISTORY_DEPTH: usize = 5;
const DEFAULT_BACKUP_INTERVAL_MS: u64 = 5 * 60 * 1000;
const DEFAULT_EXTERNAL_SYNC_INTERVAL_MS: u64 = 2 * 60 * 1000;
const DEFAULT_INTEGRITY_CHECK_INTERVAL_MS: u64 = 10 * 60 * 1000;
const DEFAULT_EMERGENCY_EXPORT_INTERVAL_MS: u64 = 60 * 60 * 1000;
const DEFAULT_QUOTA_WARN_PERCENT: u8 = 80;
const DEFAULT_QUOTA_CRITICAL_PERCENT: u8 = 90;

/// Tunables for the trash, history, backup and verification tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ProtectionConfig {
    /// How long a trashed entity stays restorable.
    pub trash_retention_days: u32,
    /// Depth of the in-substrate backup ring.
    pub backup_ring_size: usize,
    /// Depth of the durable-tier snapshot ring.
    pub external_ring_size: usize,
    /// Revisions kept per note.
    pub version_history_depth: usize,
    pub backup_interval_ms: u64,
    pub external_sync_interval_ms: u64,
    pub integrity_check_interval_ms: u64,
    pub emergency_export_interval_ms: u64,
    /// Usage percentage at which verification warns.
    pub quota_warn_percent: u8,
    /// Usage percentage at which verification reports an error.
    pub quota_critical_percent: u8,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            trash_retention_days: DEFAULT_TRASH_RETENTION_DAYS,
            backup_ring_size: DEFAULT_BACKUP_RING_SIZE,
            external_ring_size: DEFAULT_EXTERNAL_RING_SIZE,
            version_history_depth: DEFAULT_VERSION_HISTORY_DEPTH,
            backup_interval_ms: DEFAULT_BACKUP_INTERVAL_MS,
            external_sync_interval_ms: DEFAULT_EXTERNAL_SYNC_INTERVAL_MS,
            integrity_check_interval_ms: DEFAULT_INTEGRITY_CHECK_INTERVAL_MS,
            emergency_export_interval_ms: DEFAULT_EMERGENCY_EXPORT_INTERVAL_MS,
            quota_warn_percent: DEFAULT_QUOTA_WARN_PERCENT,
            quota_critical_percent: DEFAULT_QUOTA_CRITICAL_PERCENT,
        }
    }
}

impl ProtectionConfig {
    /// Parse and validate a JSON override.
    pub fn from_json_str(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::InvalidInput(format!("invalid protection config: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would disable a protection tier outright.
    pub fn validate(&self) -> Result<()> {
        if self.trash_retention_days == 0 {
            return Err(invalid("trashRetentionDays must be at least 1"));
        }
        if self.backup_ring_size == 0 {
            return Err(invalid("backupRingSize must be at least 1"));
        }
        if self.external_ring_size == 0 {
            return Err(invalid("externalRingSize must be at least 1"));
        }
        if self.version_history_depth == 0 {
            return Err(invalid("versionHistoryDepth must be at least 1"));
        }
        let intervals = [
            ("backupIntervalMs", self.backup_interval_ms),
            ("externalSyncIntervalMs", self.external_sync_interval_ms),
            ("integrityCheckIntervalMs", self.integrity_check_interval_ms),
            ("emergencyExportIntervalMs", self.emergency_export_interval_ms),
        ];
        if let Some((field, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(invalid(&format!("{field} must be greater than zero")));
        }
        if self.quota_warn_percent == 0
            || self.quota_warn_percent >= self.quota_critical_percent
            || self.quota_critical_percent > 100
        {
            return Err(invalid(
                "quota thresholds must satisfy 0 < quotaWarnPercent < quotaCriticalPercent <= 100",
            ));
        }
        Ok(())
    }

    /// Retention window in milliseconds.
    pub fn trash_retention_ms(&self) -> i64 {
        i64::from(self.trash_retention_days) * crate::util::DAY_MS
    }

    pub const fn backup_interval(&self) -> Duration {
        Duration::from_millis(self.backup_interval_ms)
    }

    pub const fn external_sync_interval(&self) -> Duration {
        Duration::from_millis(self.external_sync_interval_ms)
    }

    pub const fn integrity_check_interval(&self) -> Duration {
        Duration::from_millis(self.integrity_check_interval_ms)
    }

    pub const fn emergency_export_interval(&self) -> Duration {
        Duration::from_millis(self.emergency_export_interval_ms)
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidInput(format!("invalid protection config: {message}"))
}
