// Cofre — Enclave Module
//
// Everything that touches key material: the master secret provider (OS keyring
// or an operator-supplied secret), AES-256-GCM sealing of vault entry secrets,
// and Argon2id password hashing for identities.

mod cipher;
mod error;
mod password;
mod provider;

pub use cipher::{SecretCipher, KEY_LEN, NONCE_LEN};
pub use error::EnclaveError;
pub use password::{PasswordCost, PasswordHasher};
pub use provider::{KeyringProvider, MasterKeyProvider, StaticKeyProvider};
