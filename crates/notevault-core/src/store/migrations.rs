//! Primary document migrations

use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::models::{Settings, SCHEMA_VERSION};

/// Bring a stored document up to [`SCHEMA_VERSION`].
///
/// Returns the migrated document and whether anything changed.
pub fn run(mut document: Value) -> Result<(Value, bool)> {
    let version = get_version(&document)?;

    if version > u64::from(SCHEMA_VERSION) {
        return Err(Error::UnsupportedVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }
    if version < 2 {
        migrate_v2(&mut document)?;
    }

    Ok((document, version < u64::from(SCHEMA_VERSION)))
}

/// Get the stored version; documents written before versioning count as 1.
fn get_version(document: &Value) -> Result<u64> {
    let object = document
        .as_object()
        .ok_or_else(|| Error::Corrupted("primary document is not an object".to_string()))?;

    match object.get("version") {
        None | Some(Value::Null) => Ok(1),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| Error::Corrupted(format!("invalid document version: {value}"))),
    }
}

/// Migration to version 2: folders, focused folder, and per-note folder,
/// archive and order fields.
fn migrate_v2(document: &mut Value) -> Result<()> {
    let object = document
        .as_object_mut()
        .ok_or_else(|| Error::Corrupted("primary document is not an object".to_string()))?;

    object.entry("folders").or_insert_with(|| json!([]));
    object.entry("currentFolderId").or_insert(Value::Null);
    object.entry("currentNoteId").or_insert(Value::Null);
    if !object.contains_key("settings") {
        object.insert("settings".to_string(), serde_json::to_value(Settings::default())?);
    }

    let notes = object
        .entry("notes")
        .or_insert_with(|| json!([]))
        .as_array_mut()
        .ok_or_else(|| Error::Corrupted("notes is not an array".to_string()))?;
    for note in notes.iter_mut().filter_map(Value::as_object_mut) {
        backfill_note(note);
    }

    object.insert("version".to_string(), json!(2));
    tracing::info!("Migrated primary document to version 2");
    Ok(())
}

fn backfill_note(note: &mut Map<String, Value>) {
    note.entry("folderId").or_insert(Value::Null);
    note.entry("isArchived").or_insert(Value::Bool(false));
    note.entry("order").or_insert(json!(0));
}
