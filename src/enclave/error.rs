// Cofre — Enclave error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Key derivation error: {0}")]
    Derivation(String),

    #[error("Master secret not found; run `cofre init` first")]
    MasterSecretNotFound,

    #[error("Invalid master secret: {0}")]
    InvalidMasterSecret(String),

    #[error("Encryption failed")]
    Seal,

    #[error("Sealed secret is corrupted or was sealed under a different key")]
    Open,

    #[error("Password hashing error: {0}")]
    PasswordHash(String),
}
