//! Salted bcrypt password hashing.
//!
//! Each registration draws a fresh 8-byte salt from the OS entropy source.
//! The salt is prepended to the password before bcrypt (which also embeds its
//! own salt and cost in the output string), and the salt is stored next to
//! the hash so login can rebuild the same input.

use rand::rngs::OsRng;
use rand::TryRngCore;
use thiserror::Error;

/// Salt byte length.
pub const SALT_BYTES: usize = 8;

/// Production work factor.
pub const DEFAULT_COST: u32 = 14;

/// bcrypt only consumes this many input bytes.
const BCRYPT_MAX_INPUT: usize = 72;

/// Longest password that survives bcrypt without silent truncation.
pub const MAX_PASSWORD_BYTES: usize = BCRYPT_MAX_INPUT - SALT_BYTES;

pub type Salt = [u8; SALT_BYTES];

#[derive(Debug, Error)]
pub enum HashError {
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    #[error("password exceeds {max} bytes", max = MAX_PASSWORD_BYTES)]
    TooLong,

    #[error("bcrypt failure: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

#[derive(Debug)]
pub struct PasswordHasher {
    cost: u32,
    /// Hash compared against when the account does not exist, so unknown
    /// users cost the same as wrong passwords. Built in [`Self::new`].
    decoy: Option<String>,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        let decoy = bcrypt::hash(b"phi-decoy-password", cost)
            .map_err(|e| tracing::warn!("Could not prepare decoy hash: {e}"))
            .ok();
        Self { cost, decoy }
    }

    /// Hash `password` under a new random salt.
    pub fn hash(&self, password: &str) -> Result<(String, Salt), HashError> {
        let mut salt = [0u8; SALT_BYTES];
        fill_random(&mut salt)?;
        let hash = bcrypt::hash(salted(&salt, password)?, self.cost)?;
        Ok((hash, salt))
    }

    /// Check `password` against a stored hash through bcrypt's own verifier.
    pub fn verify(&self, password: &str, salt: &Salt, expected: &str) -> Result<bool, HashError> {
        let input = match salted(salt, password) {
            Ok(input) => input,
            Err(HashError::TooLong) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(bcrypt::verify(input, expected)?)
    }

    /// Spend one verification worth of CPU without a real account.
    pub fn burn(&self, password: &str) {
        if let Some(decoy) = &self.decoy {
            let _ = self.verify(password, &[0u8; SALT_BYTES], decoy);
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

/// Fill `buf` from the OS entropy source. Never falls back to a weaker RNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<(), HashError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| HashError::Entropy(e.to_string()))
}

fn salted(salt: &Salt, password: &str) -> Result<Vec<u8>, HashError> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(HashError::TooLong);
    }
    let mut input = Vec::with_capacity(SALT_BYTES + password.len());
    input.extend_from_slice(salt);
    input.extend_from_slice(password.as_bytes());
    Ok(input)
}
