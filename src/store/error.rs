// Cofre — Store error types
//
// The variants follow the caller-facing taxonomy: the first group is expected
// control flow and is shown to the caller verbatim, `Timeout` and `Storage`
// are internal failures that are logged and surfaced opaquely.

use thiserror::Error;

use crate::enclave::EnclaveError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid reference: {0}")]
    Reference(String),

    #[error("Cannot deactivate {what}: {count} active vault {} it", entries_word(.count))]
    ReferenceInUse { what: String, count: i64 },

    #[error("Already in use: {0}")]
    Duplicate(String),

    #[error("No valid field to update")]
    NoOp,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Storage(rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] EnclaveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),
}

impl StoreError {
    /// True for failures the caller cannot correct (storage, timeouts, crypto).
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout(_)
                | StoreError::Storage(_)
                | StoreError::Json(_)
                | StoreError::Crypto(_)
                | StoreError::Io(_)
                | StoreError::Schema(_)
        )
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "Internal error, please try again later".to_string()
        } else {
            self.to_string()
        }
    }
}

fn entries_word(count: &i64) -> &'static str {
    if *count == 1 {
        "entry still references"
    } else {
        "entries still reference"
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        if let rusqlite::Error::SqliteFailure(inner, _) = &err {
            match inner.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    return StoreError::Timeout(format!(
                        "statement did not complete in time: {}",
                        err
                    ));
                }
                ErrorCode::ConstraintViolation
                    if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    tracing::debug!(error = %err, "Unique constraint rejected a write");
                    return StoreError::Duplicate("this value".to_string());
                }
                _ => {}
            }
        }
        StoreError::Storage(err)
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Timeout(format!("could not acquire a database connection: {}", err))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_shown_verbatim() {
        let err = StoreError::Duplicate("location code SP01".to_string());
        assert!(!err.is_internal());
        assert_eq!(err.public_message(), "Already in use: location code SP01");
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let err = StoreError::Timeout("pool exhausted".to_string());
        assert!(err.is_internal());
        assert!(!err.public_message().contains("pool"));
    }

    #[test]
    fn test_reference_in_use_message_pluralises() {
        let one = StoreError::ReferenceInUse { what: "location SP01".into(), count: 1 };
        let many = StoreError::ReferenceInUse { what: "location SP01".into(), count: 3 };
        assert!(one.to_string().contains("1 active vault entry still"));
        assert!(many.to_string().contains("3 active vault entries still"));
    }

    #[test]
    fn test_busy_sqlite_error_maps_to_timeout() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        assert!(matches!(StoreError::from(err), StoreError::Timeout(_)));
    }

    #[test]
    fn test_unique_violation_hides_schema_details() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
            },
            Some("UNIQUE constraint failed: localidades.codigo".to_string()),
        );
        let mapped = StoreError::from(err);
        assert!(matches!(mapped, StoreError::Duplicate(_)));
        assert_eq!(mapped.public_message(), "Already in use: this value");
        assert!(!mapped.to_string().contains("localidades"));
    }
}
