//! Argon2id password hashing

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, ParamsBuilder, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Hashes and verifies account passwords.
///
/// Hashing is CPU-bound, so the async wrappers move the work onto the
/// blocking pool.
#[derive(Clone)]
pub struct PasswordCrypto {
    argon2: Arc<Argon2<'static>>,
    min_length: usize,
}

impl PasswordCrypto {
    const DEFAULT_MEMORY_KIB: u32 = 19 * 1024;
    const DEFAULT_ITERATIONS: u32 = 2;
    const DEFAULT_PARALLELISM: u32 = 1;
    const SALT_LENGTH: usize = 16;

    pub fn new(min_length: usize) -> Result<Self> {
        let params = ParamsBuilder::new()
            .m_cost(Self::DEFAULT_MEMORY_KIB)
            .t_cost(Self::DEFAULT_ITERATIONS)
            .p_cost(Self::DEFAULT_PARALLELISM)
            .build()
            .map_err(|e| Error::config(format!("invalid Argon2 parameters: {}", e)))?;
        Ok(Self::with_params(min_length, params))
    }

    /// Caller-chosen cost parameters, mainly for fast tests
    pub fn with_params(min_length: usize, params: Params) -> Self {
        Self {
            argon2: Arc::new(Argon2::new(Algorithm::Argon2id, Version::V0x13, params)),
            min_length,
        }
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// Rejects passwords shorter than the configured minimum
    pub fn check_strength(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.min_length {
            return Err(Error::validation(
                "password",
                format!("must be at least {} characters", self.min_length),
            ));
        }
        Ok(())
    }

    /// PHC string for `password`
    pub fn hash_blocking(&self, password: &str) -> Result<String> {
        let mut salt_bytes = [0u8; Self::SALT_LENGTH];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| Error::internal(HashError(e.to_string())))?;

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::internal(HashError(e.to_string())))
    }

    /// False for a wrong password or an unparseable stored hash
    pub fn verify_blocking(&self, password: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!("Stored password hash is not a PHC string: {}", e);
                false
            }
        }
    }

    pub async fn hash(&self, password: &str) -> Result<String> {
        let this = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || this.hash_blocking(&password))
            .await
            .map_err(Error::internal)?
    }

    pub async fn verify(&self, password: &str, stored_hash: &str) -> Result<bool> {
        let this = self.clone();
        let password = password.to_string();
        let stored_hash = stored_hash.to_string();
        tokio::task::spawn_blocking(move || this.verify_blocking(&password, &stored_hash))
            .await
            .map_err(Error::internal)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
struct HashError(String);

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PasswordCrypto {
        let params = ParamsBuilder::new().m_cost(8).t_cost(1).p_cost(1).build().unwrap();
        PasswordCrypto::with_params(6, params)
    }

    #[test]
    fn test_hash_then_verify() {
        let crypto = fast();
        let hash = crypto.hash_blocking("secret1").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(crypto.verify_blocking("secret1", &hash));
        assert!(!crypto.verify_blocking("secret2", &hash));
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let crypto = fast();
        let a = crypto.hash_blocking("secret1").unwrap();
        let b = crypto.hash_blocking("secret1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!fast().verify_blocking("secret1", "plaintext"));
    }

    #[test]
    fn test_minimum_length() {
        let crypto = fast();
        assert!(crypto.check_strength("12345").is_err());
        assert!(crypto.check_strength("123456").is_ok());
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let crypto = fast();
        let hash = crypto.hash("hunter22").await.unwrap();
        assert!(crypto.verify("hunter22", &hash).await.unwrap());
    }
}
