//! Error types for notevault-core

use thiserror::Error;

/// Result type alias using notevault-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in notevault-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Key-value substrate failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// The substrate refused a write because its capacity ceiling was reached
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Durable database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The primary document exists but cannot be read as a schema
    #[error("Corrupted primary document: {0}")]
    Corrupted(String),

    /// The stored document was written by a newer release
    #[error("Document version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u64, supported: u32 },

    /// A restore payload failed schema validation
    #[error("Invalid restore payload: {}", .0.join("; "))]
    InvalidPayload(Vec<String>),
}

impl Error {
    /// Whether this error means the substrate ran out of capacity.
    ///
    /// Substrates report quota exhaustion inconsistently, so besides the
    /// dedicated variant any error mentioning a quota counts.
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            Self::QuotaExceeded(_) => true,
            other => other.to_string().to_ascii_lowercase().contains("quota"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_quota_errors_by_variant_and_message() {
        assert!(Error::QuotaExceeded("full".to_string()).is_quota_exceeded());
        assert!(
            Error::Storage("QUOTA_BYTES quota exceeded".to_string()).is_quota_exceeded()
        );
        assert!(!Error::Storage("disk unplugged".to_string()).is_quota_exceeded());
        assert!(!Error::NotFound("note".to_string()).is_quota_exceeded());
    }

    #[test]
    fn invalid_payload_joins_messages() {
        let error = Error::InvalidPayload(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(error.to_string(), "Invalid restore payload: a; b");
    }
}
