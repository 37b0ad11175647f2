// Cofre — Vault entry secret cipher
//
// Secrets are sealed with AES-256-GCM. A sealed secret is stored as
// `nonce (12 bytes) || ciphertext+tag`, with a fresh random nonce per seal.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use super::{EnclaveError, MasterKeyProvider};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Seals and opens vault entry secrets. Cheap to share across threads.
pub struct SecretCipher {
    aead: Aes256Gcm,
}

impl SecretCipher {
    pub fn from_key(key: &[u8; KEY_LEN]) -> Self {
        Self {
            aead: Aes256Gcm::new(key.into()),
        }
    }

    /// Derive the cipher key from a provider's master secret.
    pub fn from_provider(provider: &dyn MasterKeyProvider) -> Result<Self, EnclaveError> {
        let master = provider.master_secret()?;
        let key = provider.derive_cipher_key(&master)?;
        Ok(Self::from_key(&key))
    }

    pub fn seal(&self, plaintext: &str) -> Result<Vec<u8>, EnclaveError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| EnclaveError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Zeroizing<String>, EnclaveError> {
        if sealed.len() <= NONCE_LEN {
            return Err(EnclaveError::Open);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let plaintext = Zeroizing::new(
            self.aead
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| EnclaveError::Open)?,
        );
        let text = std::str::from_utf8(&plaintext).map_err(|_| EnclaveError::Open)?;
        Ok(Zeroizing::new(text.to_string()))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
