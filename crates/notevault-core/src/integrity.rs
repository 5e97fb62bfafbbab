//! Integrity verifier.
//!
//! Inspects the primary document and its surroundings and classifies what it
//! finds. Verification never mutates anything; acting on a report (recovery
//! on schema failure) is the caller's job.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::ProtectionConfig;
use crate::error::Error;
use crate::models::StorageSchema;
use crate::storage::{StorageArea, BACKUP_RING_KEY, PRIMARY_DOCUMENT_KEY};
use crate::store;
use crate::util::{now_ms, percent_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FindingKind {
    MissingDocument,
    SchemaInvalid,
    UnsupportedVersion,
    DuplicateId,
    TimestampOrder,
    FutureTimestamp,
    NoBackups,
    QuotaCritical,
    QuotaHigh,
}

impl FindingKind {
    pub const fn severity(self) -> Severity {
        match self {
            Self::MissingDocument
            | Self::SchemaInvalid
            | Self::UnsupportedVersion
            | Self::DuplicateId
            | Self::QuotaCritical => Severity::Error,
            Self::TimestampOrder | Self::FutureTimestamp | Self::NoBackups | Self::QuotaHigh => {
                Severity::Warning
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub findings: Vec<Finding>,
}

impl IntegrityReport {
    fn push(&mut self, kind: FindingKind, message: String) {
        let severity = kind.severity();
        match severity {
            Severity::Error => self.errors.push(message.clone()),
            Severity::Warning => self.warnings.push(message.clone()),
        }
        self.findings.push(Finding {
            kind,
            severity,
            message,
        });
    }

    pub fn has(&self, kind: FindingKind) -> bool {
        self.findings.iter().any(|finding| finding.kind == kind)
    }

    /// Whether the findings call for the recovery chain.
    ///
    /// A document from a newer release is left alone: replacing it with an
    /// older backup would throw away whatever that release wrote.
    pub fn needs_recovery(&self) -> bool {
        self.has(FindingKind::SchemaInvalid)
    }
}

/// Structural problems in a raw document, empty when the shape is sound.
///
/// Accepts every stored version the migrations understand, so fields added
/// in later versions are checked only when present.
pub fn validate_schema_shape(value: &Value) -> Vec<String> {
    let mut problems = Vec::new();
    let Some(document) = value.as_object() else {
        problems.push("document is not an object".to_string());
        return problems;
    };

    if let Some(version) = document.get("version") {
        if !(version.is_u64() || version.is_null()) {
            problems.push("version must be a non-negative integer".to_string());
        }
    }

    match document.get("notes") {
        Some(Value::Array(notes)) => {
            for (index, note) in notes.iter().enumerate() {
                check_entity(&mut problems, &format!("notes[{index}]"), note, &[
                    ("title", Kind::String),
                    ("content", Kind::String),
                    ("folderId", Kind::NullableString),
                    ("tags", Kind::Array),
                ]);
            }
        }
        _ => problems.push("notes must be an array".to_string()),
    }

    match document.get("folders") {
        None => {}
        Some(Value::Array(folders)) => {
            for (index, folder) in folders.iter().enumerate() {
                check_entity(&mut problems, &format!("folders[{index}]"), folder, &[
                    ("name", Kind::String),
                    ("parentId", Kind::NullableString),
                ]);
            }
        }
        Some(_) => problems.push("folders must be an array".to_string()),
    }

    if let Some(settings) = document.get("settings") {
        if !settings.is_object() {
            problems.push("settings must be an object".to_string());
        }
    }
    for key in ["currentNoteId", "currentFolderId"] {
        if let Some(id) = document.get(key) {
            if !(id.is_string() || id.is_null()) {
                problems.push(format!("{key} must be a string or null"));
            }
        }
    }

    problems
}

#[derive(Clone, Copy)]
enum Kind {
    String,
    NullableString,
    Array,
}

impl Kind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::NullableString => value.is_string() || value.is_null(),
            Self::Array => value.is_array(),
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::NullableString => "a string or null",
            Self::Array => "an array",
        }
    }
}

/// Required: string `id`, numeric timestamps. Optional fields are checked
/// only when present.
fn check_entity(problems: &mut Vec<String>, path: &str, entity: &Value, optional: &[(&str, Kind)]) {
    let Some(fields) = entity.as_object() else {
        problems.push(format!("{path} is not an object"));
        return;
    };
    if !fields.get("id").is_some_and(Value::is_string) {
        problems.push(format!("{path}.id must be a string"));
    }
    for key in ["createdAt", "updatedAt"] {
        if !fields.get(key).is_some_and(Value::is_i64) {
            problems.push(format!("{path}.{key} must be an integer timestamp"));
        }
    }
    for (key, kind) in optional {
        if let Some(value) = fields.get(*key) {
            if !kind.matches(value) {
                problems.push(format!("{path}.{key} must be {}", kind.describe()));
            }
        }
    }
}

fn check_duplicates<'a>(
    report: &mut IntegrityReport,
    label: &str,
    ids: impl Iterator<Item = &'a str>,
) {
    let mut seen = BTreeSet::new();
    let mut reported = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) && reported.insert(id) {
            report.push(FindingKind::DuplicateId, format!("Duplicate {label} id: {id}"));
        }
    }
}

fn check_timestamps(
    report: &mut IntegrityReport,
    label: &str,
    id: &str,
    created_at: i64,
    updated_at: i64,
    now: i64,
) {
    if updated_at < created_at {
        report.push(
            FindingKind::TimestampOrder,
            format!("{label} {id} was updated ({updated_at}) before it was created ({created_at})"),
        );
    }
    if created_at > now {
        report.push(
            FindingKind::FutureTimestamp,
            format!("{label} {id} has a creation time in the future ({created_at})"),
        );
    }
}

#[derive(Clone)]
pub struct IntegrityVerifier {
    area: Arc<dyn StorageArea>,
    warn_percent: u8,
    critical_percent: u8,
}

impl IntegrityVerifier {
    pub fn new(area: Arc<dyn StorageArea>, config: &ProtectionConfig) -> Self {
        Self {
            area,
            warn_percent: config.quota_warn_percent,
            critical_percent: config.quota_critical_percent,
        }
    }

    pub async fn verify(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();

        match self.area.get(PRIMARY_DOCUMENT_KEY).await {
            Ok(Some(value)) => Self::check_document(&mut report, value),
            Ok(None) => report.push(
                FindingKind::MissingDocument,
                "Primary document is missing".to_string(),
            ),
            Err(error) => report.push(
                FindingKind::MissingDocument,
                format!("Primary document could not be read: {error}"),
            ),
        }

        self.check_backups(&mut report).await;
        self.check_quota(&mut report).await;

        report.is_valid = report.errors.is_empty();
        if !report.is_valid {
            tracing::warn!("Integrity check found errors: {:?}", report.errors);
        } else if !report.warnings.is_empty() {
            tracing::info!("Integrity check warnings: {:?}", report.warnings);
        }
        report
    }

    fn check_document(report: &mut IntegrityReport, value: Value) {
        let problems = validate_schema_shape(&value);
        if !problems.is_empty() {
            for problem in problems {
                report.push(FindingKind::SchemaInvalid, problem);
            }
            return;
        }

        let schema: StorageSchema = match store::parse_document(value) {
            Ok(schema) => schema,
            Err(error @ Error::UnsupportedVersion { .. }) => {
                report.push(FindingKind::UnsupportedVersion, error.to_string());
                return;
            }
            Err(error) => {
                report.push(FindingKind::SchemaInvalid, error.to_string());
                return;
            }
        };

        check_duplicates(report, "note", schema.notes.iter().map(|note| note.id.as_str()));
        check_duplicates(
            report,
            "folder",
            schema.folders.iter().map(|folder| folder.id.as_str()),
        );

        let now = now_ms();
        for note in &schema.notes {
            check_timestamps(report, "Note", note.id.as_str(), note.created_at, note.updated_at, now);
        }
        for folder in &schema.folders {
            check_timestamps(
                report,
                "Folder",
                folder.id.as_str(),
                folder.created_at,
                folder.updated_at,
                now,
            );
        }
    }

    async fn check_backups(&self, report: &mut IntegrityReport) {
        let count = match self.area.get(BACKUP_RING_KEY).await {
            Ok(ring) => ring.as_ref().and_then(Value::as_array).map_or(0, Vec::len),
            Err(error) => {
                tracing::warn!("Could not read backup ring: {error}");
                0
            }
        };
        if count == 0 {
            report.push(FindingKind::NoBackups, "No backups available".to_string());
        }
    }

    async fn check_quota(&self, report: &mut IntegrityReport) {
        let Some(quota) = self.area.quota_bytes() else {
            return;
        };
        let used = match self.area.bytes_in_use().await {
            Ok(used) => used,
            Err(error) => {
                tracing::warn!("Could not measure storage usage: {error}");
                return;
            }
        };
        let percent = percent_of(used, quota);
        if percent >= f64::from(self.critical_percent) {
            report.push(
                FindingKind::QuotaCritical,
                format!("Storage is {percent:.1}% full ({used} of {quota} bytes)"),
            );
        } else if percent >= f64::from(self.warn_percent) {
            report.push(
                FindingKind::QuotaHigh,
                format!("Storage is {percent:.1}% full ({used} of {quota} bytes)"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;
    use crate::storage::{self, MemoryStorageArea};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn verifier(area: &Arc<MemoryStorageArea>) -> IntegrityVerifier {
        IntegrityVerifier::new(area.clone(), &ProtectionConfig::default())
    }

    async fn write(area: &MemoryStorageArea, schema: &StorageSchema) {
        storage::write_json(area, PRIMARY_DOCUMENT_KEY, schema)
            .await
            .unwrap();
        area.set(BACKUP_RING_KEY, json!([{}])).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_id_is_reported_once() {
        let area = Arc::new(MemoryStorageArea::unbounded());
        let schema = StorageSchema {
            notes: vec![
                Note::new("a", "").with_id("x"),
                Note::new("b", "").with_id("x"),
                Note::new("c", "").with_id("x"),
                Note::new("d", "").with_id("y"),
            ],
            ..StorageSchema::default()
        };
        write(&area, &schema).await;

        let report = verifier(&area).verify().await;
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0], "Duplicate note id: x");
        assert!(!report.needs_recovery());
    }

    #[tokio::test]
    async fn test_healthy_document_is_valid() {
        let area = Arc::new(MemoryStorageArea::unbounded());
        write(&area, &StorageSchema::default()).await;

        let report = verifier(&area).verify().await;
        assert!(report.is_valid);
        assert!(report.findings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_document_and_backups() {
        let area = Arc::new(MemoryStorageArea::unbounded());
        let report = verifier(&area).verify().await;

        assert!(!report.is_valid);
        assert!(report.has(FindingKind::MissingDocument));
        assert!(report.has(FindingKind::NoBackups));
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_shape_needs_recovery() {
        let area = Arc::new(MemoryStorageArea::unbounded());
        area.set(PRIMARY_DOCUMENT_KEY, json!({"version": 2, "notes": {"a": 1}}))
            .await
            .unwrap();

        let report = verifier(&area).verify().await;
        assert!(report.needs_recovery());
        assert_eq!(report.errors, vec!["notes must be an array".to_string()]);
    }

    #[tokio::test]
    async fn test_newer_document_is_flagged_without_recovery() {
        let area = Arc::new(MemoryStorageArea::unbounded());
        area.set(PRIMARY_DOCUMENT_KEY, json!({"version": 9, "notes": []}))
            .await
            .unwrap();

        let report = verifier(&area).verify().await;
        assert!(!report.is_valid);
        assert!(report.has(FindingKind::UnsupportedVersion));
        assert!(!report.has(FindingKind::SchemaInvalid));
        assert!(!report.needs_recovery());
    }

    #[tokio::test]
    async fn test_timestamp_warnings() {
        let area = Arc::new(MemoryStorageArea::unbounded());
        let mut backwards = Note::new("backwards", "").with_id("b");
        backwards.updated_at = backwards.created_at - 10;
        let mut future = Note::new("future", "").with_id("f");
        future.created_at = now_ms() + 3_600_000;
        future.updated_at = future.created_at;
        write(&area, &StorageSchema {
            notes: vec![backwards, future],
            ..StorageSchema::default()
        })
        .await;

        let report = verifier(&area).verify().await;
        assert!(report.is_valid);
        assert!(report.has(FindingKind::TimestampOrder));
        assert!(report.has(FindingKind::FutureTimestamp));
        assert_eq!(report.warnings.len(), 2);
    }

    async fn fill_to(area: &MemoryStorageArea, target: u64) {
        area.remove("filler").await.unwrap();
        let used = area.bytes_in_use().await.unwrap();
        // key plus the two quotes around the string
        let overhead = 8;
        let padding = usize::try_from(target - used - overhead).unwrap();
        area.set("filler", json!("p".repeat(padding))).await.unwrap();
        assert_eq!(area.bytes_in_use().await.unwrap(), target);
    }

    #[tokio::test]
    async fn test_quota_thresholds() {
        let area = Arc::new(MemoryStorageArea::with_quota(10_000));
        write(&area, &StorageSchema::default()).await;

        fill_to(&area, 8_500).await;
        let report = verifier(&area).verify().await;
        assert!(report.is_valid);
        assert!(report.has(FindingKind::QuotaHigh));

        fill_to(&area, 9_500).await;
        let report = verifier(&area).verify().await;
        assert!(!report.is_valid);
        assert!(report.has(FindingKind::QuotaCritical));
        assert!(!report.has(FindingKind::QuotaHigh));
    }

    #[test]
    fn test_shape_accepts_v1_documents() {
        let v1 = json!({
            "notes": [{"id": "n", "title": "t", "content": "c", "createdAt": 1, "updatedAt": 2}]
        });
        assert!(validate_schema_shape(&v1).is_empty());

        let broken = json!({"notes": [{"id": 5, "createdAt": "yesterday", "updatedAt": 1}]});
        assert_eq!(
            validate_schema_shape(&broken),
            vec![
                "notes[0].id must be a string".to_string(),
                "notes[0].createdAt must be an integer timestamp".to_string(),
            ]
        );
        assert_eq!(validate_schema_shape(&json!([])), vec!["document is not an object".to_string()]);
    }
}
