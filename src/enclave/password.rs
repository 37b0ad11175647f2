// Cofre — Identity password hashing
//
// Argon2id PHC strings with a random salt per hash. The work factor comes from
// configuration so tests and small hosts can dial it down.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use super::EnclaveError;

/// Fixed salt and all-zero digest of the decoy hash, in unpadded base64.
const DECOY_SALT: &str = "Y29mcmUtZGVjb3ktc2FsdA";
const DECOY_DIGEST: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Argon2id work factor. The default sits around the cost of bcrypt at 12 rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordCost {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl PasswordCost {
    /// Smallest parameters Argon2 accepts. Only for tests.
    pub fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: PasswordCost,
}

impl PasswordHasher {
    pub fn new(cost: PasswordCost) -> Self {
        Self { cost }
    }

    fn argon2(&self) -> Result<Argon2<'static>, EnclaveError> {
        let params = Params::new(
            self.cost.memory_kib,
            self.cost.iterations,
            self.cost.parallelism,
            None,
        )
        .map_err(|e| EnclaveError::PasswordHash(format!("invalid Argon2 params: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a plaintext password into a PHC string.
    pub fn hash(&self, password: &str) -> Result<String, EnclaveError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| EnclaveError::PasswordHash(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// A well-formed PHC string at this hasher's cost that no password matches.
    /// Verifying against it costs what a real verification costs.
    pub fn decoy(&self) -> String {
        format!(
            "$argon2id$v=19$m={},t={},p={}${}${}",
            self.cost.memory_kib, self.cost.iterations, self.cost.parallelism, DECOY_SALT, DECOY_DIGEST
        )
    }

    /// Check a password against a stored PHC string. The parameters embedded in
    /// the hash are used, so hashes made under an older cost still verify.
    pub fn verify(&self, password: &str, phc: &str) -> bool {
        match PasswordHash::new(phc) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash is not a valid PHC string");
                false
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verifies_and_rejects_wrong_password() {
        let hasher = PasswordHasher::new(PasswordCost::minimal());
        let phc = hasher.hash("correct horse").unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &phc));
        assert!(!hasher.verify("battery staple", &phc));
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let hasher = PasswordHasher::new(PasswordCost::minimal());
        assert_ne!(hasher.hash("pw123456").unwrap(), hasher.hash("pw123456").unwrap());
    }

    #[test]
    fn test_hash_does_not_contain_plaintext() {
        let hasher = PasswordHasher::new(PasswordCost::minimal());
        assert!(!hasher.hash("plain-text-pw").unwrap().contains("plain-text-pw"));
    }

    #[test]
    fn test_cost_is_embedded_in_hash() {
        let hasher = PasswordHasher::new(PasswordCost { memory_kib: 16, iterations: 2, parallelism: 1 });
        let phc = hasher.hash("pw123456").unwrap();
        assert!(phc.contains("m=16,t=2,p=1"));
    }

    #[test]
    fn test_decoy_parses_at_configured_cost_and_never_verifies() {
        let cost = PasswordCost { memory_kib: 16, iterations: 2, parallelism: 1 };
        let hasher = PasswordHasher::new(cost);
        let decoy = hasher.decoy();

        let parsed = PasswordHash::new(&decoy).unwrap();
        let params = Params::try_from(&parsed).unwrap();
        assert_eq!(params.m_cost(), 16);
        assert_eq!(params.t_cost(), 2);
        assert_eq!(params.p_cost(), 1);
        assert_eq!(parsed.hash.map(|h| h.len()), Some(32));

        assert!(!hasher.verify("", &decoy));
        assert!(!hasher.verify("pw123456", &decoy));
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        let hasher = PasswordHasher::new(PasswordCost::minimal());
        assert!(!hasher.verify("anything", "not-a-phc-string"));
    }
}
