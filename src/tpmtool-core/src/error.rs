//! Error types for attestation and device management operations.

use thiserror::Error;

/// Errors that can occur while managing devices or verifying quotes.
#[derive(Debug, Error)]
pub enum TrustError {
    /// No device was selected for the operation.
    #[error("No device selected")]
    NoDeviceSelected,

    /// The scanner did not deliver any input.
    #[error("Scan failed")]
    ScanFailed,

    /// The referenced device no longer exists in the store.
    #[error("Device not found: {id}")]
    DeviceNotFound {
        /// Identifier that was looked up.
        id: u64,
    },

    /// A required registration field was blank.
    #[error("Some values not filled in")]
    MissingFields,

    /// The public key is not canonical base64.
    #[error("Invalid public key value")]
    InvalidPublicKey,

    /// The scanned payload did not split into signature, message and PCR digest.
    #[error("Invalid data")]
    MalformedEnvelope {
        /// Number of `|`-separated fields actually found.
        fields: usize,
    },

    /// An envelope field was not valid base64.
    #[error("Invalid data: {field} is not valid base64 ({reason})")]
    InvalidEncoding {
        /// Name of the offending field.
        field: &'static str,
        /// Decoder error message.
        reason: String,
    },

    /// The external validator rejected the quote.
    #[error("Quote verification failed: {reason}")]
    VerificationFailed {
        /// Reason reported by the validator.
        reason: String,
    },

    /// The quote document did not have the expected structure.
    #[error("Malformed quote: {reason}")]
    MalformedQuote {
        /// What was missing or mistyped.
        reason: String,
    },

    /// The device store failed or refused the operation.
    #[error("Storage error: {message}")]
    Persistence {
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}

/// Coarse grouping of [`TrustError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller supplied bad input; nothing was attempted.
    Input,
    /// The scanned payload could not be decoded.
    Envelope,
    /// The cryptographic check failed.
    Verification,
    /// A quote document (new or baseline) has the wrong shape.
    Schema,
    /// The device store failed.
    Persistence,
    /// Bad configuration.
    Config,
}

impl ErrorCategory {
    /// Stable lowercase label used as a log field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Envelope => "envelope",
            Self::Verification => "verification",
            Self::Schema => "schema",
            Self::Persistence => "persistence",
            Self::Config => "config",
        }
    }
}

impl TrustError {
    /// Create a persistence error from a message.
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a schema error from a reason.
    #[must_use]
    pub fn malformed_quote(reason: impl Into<String>) -> Self {
        Self::MalformedQuote {
            reason: reason.into(),
        }
    }

    /// Create a verification error from a reason.
    #[must_use]
    pub fn verification(reason: impl Into<String>) -> Self {
        Self::VerificationFailed {
            reason: reason.into(),
        }
    }

    /// The category this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoDeviceSelected
            | Self::ScanFailed
            | Self::DeviceNotFound { .. }
            | Self::MissingFields
            | Self::InvalidPublicKey => ErrorCategory::Input,
            Self::MalformedEnvelope { .. } | Self::InvalidEncoding { .. } => {
                ErrorCategory::Envelope
            },
            Self::VerificationFailed { .. } => ErrorCategory::Verification,
            Self::MalformedQuote { .. } => ErrorCategory::Schema,
            Self::Persistence { .. } => ErrorCategory::Persistence,
            Self::Config { .. } => ErrorCategory::Config,
        }
    }

    /// Check if this error was caused by caller input.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        self.category() == ErrorCategory::Input
    }

    /// Check if retrying the whole operation may succeed.
    ///
    /// Only store failures qualify; a rejected quote stays rejected.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}
