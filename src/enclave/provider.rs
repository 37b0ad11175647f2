// Cofre — Master Key Provider
//
// Supplies the master secret from which the vault entry cipher key is derived.
// Two sources exist: the platform keyring (interactive hosts) and a hex secret
// handed over by the operator through `COFRE_MASTER_KEY` (headless hosts).
//
// Flow:
//   1. `master_secret()`: read from the source (the keyring creates one on first use)
//   2. `derive_cipher_key()`: Argon2id over the master secret, 32 bytes for AES-256
//   3. The derived key is moved into a `SecretCipher`; intermediates are zeroized

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::cipher::KEY_LEN;
use super::EnclaveError;

// ─── Constants ───────────────────────────────────────────────────────────────

const KEYRING_SERVICE: &str = "cofre-vault";
const KEYRING_USER: &str = "secret-cipher-master";

/// Length of a generated master secret in bytes (256-bit entropy).
const MASTER_SECRET_LEN: usize = 32;

// m=65536 (64 MiB), t=3, p=4
const ARGON2_M_COST: u32 = 65536;
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Source of the master secret behind the vault entry cipher.
pub trait MasterKeyProvider {
    /// Return the master secret. Providers that can persist one create it on first use.
    fn master_secret(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError>;

    /// Whether a master secret is already available without creating one.
    fn has_master_secret(&self) -> Result<bool, EnclaveError>;

    /// Domain-separation label mixed into the Argon2id salt.
    fn salt_label(&self) -> String;

    /// Derive the 32-byte cipher key from the master secret using Argon2id.
    fn derive_cipher_key(&self, master_secret: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, EnclaveError> {
        let salt = Sha256::digest(self.salt_label().as_bytes());

        let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(KEY_LEN))
            .map_err(|e| EnclaveError::Derivation(format!("invalid Argon2 params: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(master_secret, &salt, &mut *key)
            .map_err(|e| EnclaveError::Derivation(format!("Argon2id hash failed: {}", e)))?;
        Ok(key)
    }
}

// ─── Keyring ─────────────────────────────────────────────────────────────────

/// Keeps the master secret in the platform keyring
/// (Secret Service / keyutils, macOS Keychain, Windows Credential Manager).
pub struct KeyringProvider {
    service: String,
    user: String,
}

impl KeyringProvider {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            user: KEYRING_USER.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, EnclaveError> {
        keyring::Entry::new(&self.service, &self.user)
            .map_err(|e| EnclaveError::Keyring(format!("failed to open keyring entry: {}", e)))
    }

    fn generate_master_secret() -> Zeroizing<Vec<u8>> {
        let mut secret = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
        rand::rng().fill_bytes(&mut secret);
        secret
    }
}

impl Default for KeyringProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterKeyProvider for KeyringProvider {
    fn master_secret(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        let entry = self.entry()?;

        match entry.get_secret() {
            Ok(secret) => {
                tracing::debug!("Retrieved master secret from keyring");
                Ok(Zeroizing::new(secret))
            }
            Err(keyring::Error::NoEntry) => {
                tracing::info!("No master secret in keyring, generating one");
                let secret = Self::generate_master_secret();
                entry.set_secret(&secret).map_err(|e| {
                    EnclaveError::Keyring(format!("failed to store master secret: {}", e))
                })?;
                Ok(secret)
            }
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to retrieve master secret: {}",
                e
            ))),
        }
    }

    fn has_master_secret(&self) -> Result<bool, EnclaveError> {
        match self.entry()?.get_secret() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to check master secret: {}",
                e
            ))),
        }
    }

    fn salt_label(&self) -> String {
        format!("{}::{}", self.service, self.user)
    }
}

// ─── Operator-supplied ───────────────────────────────────────────────────────

/// Master secret given by the operator as hex, e.g. through `COFRE_MASTER_KEY`.
pub struct StaticKeyProvider {
    secret: Zeroizing<Vec<u8>>,
}

impl StaticKeyProvider {
    /// Parse a hex-encoded master secret of at least 32 bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, EnclaveError> {
        let secret = Zeroizing::new(
            hex::decode(encoded.trim()).map_err(|e| EnclaveError::InvalidMasterSecret(e.to_string()))?,
        );

        if secret.len() < MASTER_SECRET_LEN {
            return Err(EnclaveError::InvalidMasterSecret(format!(
                "need at least {} bytes, got {}",
                MASTER_SECRET_LEN,
                secret.len()
            )));
        }
        Ok(Self { secret })
    }
}

impl MasterKeyProvider for StaticKeyProvider {
    fn master_secret(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        Ok(self.secret.clone())
    }

    fn has_master_secret(&self) -> Result<bool, EnclaveError> {
        Ok(true)
    }

    fn salt_label(&self) -> String {
        format!("{}::operator", KEYRING_SERVICE)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
