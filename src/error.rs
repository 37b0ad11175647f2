// Cofre — Top-level error types
//
// Aggregates errors from the store, enclave and config modules into a single
// error enum for the application boundary.

use thiserror::Error;

/// Top-level error type for all Cofre operations.
#[derive(Debug, Error)]
pub enum CofreError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error("Enclave error: {0}")]
    Enclave(#[from] crate::enclave::EnclaveError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Other(String),
}

impl CofreError {
    /// Failures the caller cannot correct; logged in full, shown opaquely.
    pub fn is_internal(&self) -> bool {
        match self {
            CofreError::Store(e) => e.is_internal(),
            CofreError::Enclave(crate::enclave::EnclaveError::MasterSecretNotFound)
            | CofreError::Enclave(crate::enclave::EnclaveError::InvalidMasterSecret(_)) => false,
            CofreError::Enclave(_) | CofreError::Io(_) => true,
            CofreError::Config(_) | CofreError::PermissionDenied(_) | CofreError::Other(_) => false,
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            CofreError::Store(e) => e.public_message(),
            other if other.is_internal() => "Internal error, please try again later".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CofreError>;

// ─── Tests ───────────────────────────────────────────────────────────────────
