//! `DataGuard`: one handle over every protection tier.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::archive::FolderArchiver;
use crate::backup::BackupManager;
use crate::bridge::{AutoRestoreOutcome, ExternalBridge};
use crate::config::ProtectionConfig;
use crate::db::Database;
use crate::emergency::EmergencyExport;
use crate::error::{Error, Result};
use crate::integrity::{FindingKind, IntegrityReport, IntegrityVerifier};
use crate::lock::WriteLock;
use crate::storage::{StorageArea, StorageChange};
use crate::store::PrimaryStore;

use super::recovery::{RecoveryChain, RecoverySource};
use super::scheduler::BackgroundJobs;

/// Outcome of one integrity pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityCheck {
    /// What the verifier found before any recovery.
    pub report: IntegrityReport,
    pub recovered_from: Option<RecoverySource>,
    /// A second pass, present only when recovery ran and succeeded.
    pub after_recovery: Option<IntegrityReport>,
}

/// What happened during [`DataGuard::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    pub schema_version: u32,
    pub notes_count: usize,
    /// Set when the stored document could not even be loaded.
    pub recovered_on_load: Option<RecoverySource>,
    pub integrity: IntegrityCheck,
    /// `None` without a durable database, or when the comparison failed.
    pub auto_restore: Option<AutoRestoreOutcome>,
}

#[derive(Clone)]
pub struct DataGuard {
    config: ProtectionConfig,
    primary: Arc<dyn StorageArea>,
    store: PrimaryStore,
    backups: BackupManager,
    bridge: Option<ExternalBridge>,
    verifier: IntegrityVerifier,
    emergency: EmergencyExport,
    archiver: FolderArchiver,
    recovery: Arc<RecoveryChain>,
}

impl DataGuard {
    /// Build every tier over `primary`, mirroring into `session`, with the
    /// durable bridge enabled when `database` is given.
    pub fn new(
        primary: Arc<dyn StorageArea>,
        session: Arc<dyn StorageArea>,
        database: Option<Database>,
        config: ProtectionConfig,
    ) -> Result<Self> {
        config.validate()?;

        let lock = Arc::new(WriteLock::new());
        let backups = BackupManager::new(Arc::clone(&primary), Arc::clone(&lock), &config);
        let bridge = database.map(|db| {
            ExternalBridge::new(db, Arc::clone(&primary), Arc::clone(&lock), &config)
        });
        let recovery = Arc::new(RecoveryChain::new(backups.clone(), bridge.clone()));
        let store = PrimaryStore::new(Arc::clone(&primary), Arc::clone(&lock), &config)
            .with_recovery(Arc::clone(&recovery));

        Ok(Self {
            verifier: IntegrityVerifier::new(Arc::clone(&primary), &config),
            emergency: EmergencyExport::new(Arc::clone(&primary), session, lock),
            archiver: FolderArchiver::new(store.clone()),
            config,
            primary,
            store,
            backups,
            bridge,
            recovery,
        })
    }

    /// Bring the primary document to a usable state.
    ///
    /// Loads and migrates it (recovering if it cannot be loaded), runs an
    /// integrity pass, then lets the durable bridge refill an empty primary.
    pub async fn initialize(&self) -> Result<StartupReport> {
        let mut recovered_on_load = None;
        if let Err(error) = self.store.initialize().await {
            if !matches!(error, Error::Corrupted(_)) {
                return Err(error);
            }
            tracing::error!("Primary document could not be loaded at startup: {error}");
            recovered_on_load = Some(self.recovery.recover().await?);
            self.store.initialize().await?;
        }

        let integrity = self.run_integrity_check().await;

        let auto_restore = match &self.bridge {
            Some(bridge) => match bridge.check_and_auto_restore().await {
                Ok(outcome) => Some(outcome),
                Err(error) => {
                    tracing::warn!("Durable snapshot comparison failed: {error}");
                    None
                }
            },
            None => None,
        };

        let schema = self.store.load_document().await?;
        tracing::info!(
            "Data protection ready: {} notes, {} folders",
            schema.notes.len(),
            schema.folders.len()
        );
        Ok(StartupReport {
            schema_version: schema.version,
            notes_count: schema.notes.len(),
            recovered_on_load,
            integrity,
            auto_restore,
        })
    }

    /// Verify, and run the recovery chain if the document's shape is broken.
    pub async fn run_integrity_check(&self) -> IntegrityCheck {
        let report = self.verifier.verify().await;
        if report.has(FindingKind::UnsupportedVersion) {
            tracing::warn!("Primary document was written by a newer release; leaving it untouched");
        }
        if !report.needs_recovery() {
            return IntegrityCheck {
                report,
                recovered_from: None,
                after_recovery: None,
            };
        }

        match self.recovery.recover().await {
            Ok(source) => IntegrityCheck {
                report,
                recovered_from: Some(source),
                after_recovery: Some(self.verifier.verify().await),
            },
            Err(error) => {
                tracing::error!("Integrity recovery failed; primary document left as is: {error}");
                IntegrityCheck {
                    report,
                    recovered_from: None,
                    after_recovery: None,
                }
            }
        }
    }

    /// Spawn the recurring backup, durable sync, integrity and emergency
    /// export jobs. They stop when the returned value is dropped.
    pub fn start_background_jobs(&self) -> BackgroundJobs {
        let mut jobs = BackgroundJobs::new();

        let backups = self.backups.clone();
        jobs.spawn_periodic("backup", self.config.backup_interval(), move || {
            let backups = backups.clone();
            async move {
                if let Err(error) = backups.create_backup().await {
                    tracing::warn!("Scheduled backup failed: {error}");
                }
            }
        });

        if let Some(bridge) = self.bridge.clone() {
            jobs.spawn_periodic("external-sync", self.config.external_sync_interval(), move || {
                let bridge = bridge.clone();
                async move {
                    if let Err(error) = bridge.sync_from_primary().await {
                        tracing::warn!("Durable snapshot sync failed: {error}");
                    }
                }
            });
        }

        let guard = self.clone();
        jobs.spawn_periodic("integrity-check", self.config.integrity_check_interval(), move || {
            let guard = guard.clone();
            async move {
                guard.run_integrity_check().await;
            }
        });

        let emergency = self.emergency.clone();
        jobs.spawn_periodic("emergency-export", self.config.emergency_export_interval(), move || {
            let emergency = emergency.clone();
            async move {
                if let Err(error) = emergency.export_to_session_mirror().await {
                    tracing::warn!("Emergency export failed: {error}");
                }
            }
        });

        jobs
    }

    /// Change notifications for every key in the primary area.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.primary.subscribe()
    }

    pub const fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    pub const fn store(&self) -> &PrimaryStore {
        &self.store
    }

    pub const fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub const fn bridge(&self) -> Option<&ExternalBridge> {
        self.bridge.as_ref()
    }

    pub const fn verifier(&self) -> &IntegrityVerifier {
        &self.verifier
    }

    pub const fn emergency(&self) -> &EmergencyExport {
        &self.emergency
    }

    pub const fn archiver(&self) -> &FolderArchiver {
        &self.archiver
    }
}
