//! Registered devices and their trust baseline.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::TrustError;

/// Store-assigned device identifier.
pub type DeviceId = u64;

/// A remote device whose attestation key was registered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Store-assigned identifier (0 until inserted).
    pub id: DeviceId,
    /// Display name.
    pub name: String,
    /// Base64 public key body (PEM without headers).
    pub public_key: String,
    /// Last accepted quote document; empty if never attested.
    #[serde(default)]
    pub baseline: String,
    /// Unix time of the last accepted baseline.
    #[serde(default)]
    pub last_success: Option<i64>,
}

impl Device {
    /// A not-yet-stored device with no baseline.
    pub fn new(name: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            public_key: public_key.into(),
            baseline: String::new(),
            last_success: None,
        }
    }

    /// True once a baseline has been accepted.
    pub fn has_baseline(&self) -> bool {
        !self.baseline.is_empty()
    }

    /// Decoded public key bytes.
    ///
    /// # Errors
    ///
    /// `InvalidPublicKey` if the stored key is not base64.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>, TrustError> {
        base64::engine::general_purpose::STANDARD
            .decode(self.public_key.trim())
            .map_err(|_| TrustError::InvalidPublicKey)
    }
}

/// Validate user-supplied registration fields.
///
/// Returns the trimmed public key, which must survive a base64
/// decode/encode round trip unchanged.
///
/// # Errors
///
/// `MissingFields` for a blank name or key, `InvalidPublicKey` otherwise.
pub fn validate_registration(name: &str, public_key: &str) -> Result<String, TrustError> {
    let key = public_key.trim();
    if name.trim().is_empty() || key.is_empty() {
        return Err(TrustError::MissingFields);
    }

    let engine = base64::engine::general_purpose::STANDARD;
    let decoded = engine
        .decode(key)
        .map_err(|_| TrustError::InvalidPublicKey)?;
    if engine.encode(decoded) != key {
        return Err(TrustError::InvalidPublicKey);
    }

    Ok(key.to_string())
}
