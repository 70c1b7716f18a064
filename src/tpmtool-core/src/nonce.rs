//! Freshness challenges embedded in each attestation round.
//!
//! A nonce is 6 random bytes (standard base64, no padding) followed by the
//! decimal Unix time in seconds. Expiry is not enforced here; the external
//! validator may use the embedded timestamp for that.

use std::fmt;

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes in a generated nonce.
pub const NONCE_RANDOM_BYTES: usize = 6;

/// A single-use freshness token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a fresh nonce from the OS RNG and the system clock.
    pub fn generate() -> Self {
        Self::generate_at(unix_now())
    }

    /// Generate a nonce stamped with the given Unix time.
    pub fn generate_at(unix_secs: i64) -> Self {
        let mut bytes = [0u8; NONCE_RANDOM_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let prefix = base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes);
        Self(format!("{prefix}{unix_secs}"))
    }

    /// Wrap a user-supplied value verbatim.
    pub fn custom(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The nonce text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UTF-8 bytes handed to the quote validator.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Nonce {
    fn from(value: &str) -> Self {
        Self::custom(value)
    }
}

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
