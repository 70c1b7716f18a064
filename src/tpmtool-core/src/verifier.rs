//! Boundary to the external TPM quote validator.
//!
//! The signature and quote cryptography live outside this crate. The engine
//! only builds the byte-level inputs and treats any non-success as a failed
//! verification. Failures are not retried: a rejected quote is not a
//! transient condition.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::envelope::QuoteEnvelope;
use crate::error::TrustError;
use crate::nonce::Nonce;

/// Byte-level inputs for one quote validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierInput {
    /// Attestation public key, base64-decoded from the device record.
    pub public_key: Vec<u8>,
    /// Signed TPMS_ATTEST message.
    pub message: Vec<u8>,
    /// PCR digest structure.
    pub pcr_digest: Vec<u8>,
    /// Quote signature.
    pub signature: Vec<u8>,
    /// UTF-8 bytes of the nonce issued for this round.
    pub nonce: Vec<u8>,
}

impl VerifierInput {
    /// Assemble the inputs from a decoded envelope.
    pub fn new(public_key: Vec<u8>, envelope: QuoteEnvelope, nonce: &Nonce) -> Self {
        Self {
            public_key,
            message: envelope.message,
            pcr_digest: envelope.pcr_digest,
            signature: envelope.signature,
            nonce: nonce.as_bytes().to_vec(),
        }
    }
}

/// Validates a TPM quote and returns the raw quote document.
#[async_trait]
pub trait QuoteVerifier: Send + Sync {
    /// Validate the quote.
    ///
    /// On success returns the validator's JSON document describing the
    /// attested PCR values. Partial output on failure must not be used.
    async fn verify(&self, input: &VerifierInput) -> Result<String, TrustError>;
}

/// Runs an external validator executable.
///
/// The program receives `--pubkey --message --pcr --signature --nonce`, each
/// followed by the base64 encoding of the corresponding input. Exit status
/// zero with UTF-8 stdout is success; stderr becomes the failure reason.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandVerifier {
    /// Create a verifier for the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the generated ones.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn arguments(&self, input: &VerifierInput) -> Vec<String> {
        let b64 = |bytes: &[u8]| base64::engine::general_purpose::STANDARD.encode(bytes);
        let mut args = self.args.clone();
        for (flag, value) in [
            ("--pubkey", &input.public_key),
            ("--message", &input.message),
            ("--pcr", &input.pcr_digest),
            ("--signature", &input.signature),
            ("--nonce", &input.nonce),
        ] {
            args.push(flag.to_string());
            args.push(b64(value.as_slice()));
        }
        args
    }
}

#[async_trait]
impl QuoteVerifier for CommandVerifier {
    async fn verify(&self, input: &VerifierInput) -> Result<String, TrustError> {
        debug!(program = %self.program.display(), "Verifier: invoking external validator");

        let output = Command::new(&self.program)
            .args(self.arguments(input))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                TrustError::verification(format!(
                    "failed to run {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = %output.status, "Verifier: validator rejected quote");
            let reason = if stderr.is_empty() {
                format!("validator exited with {}", output.status)
            } else {
                stderr
            };
            return Err(TrustError::VerificationFailed { reason });
        }

        String::from_utf8(output.stdout)
            .map_err(|_| TrustError::verification("validator output is not UTF-8"))
    }
}

/// Placeholder used when no validator is configured. Rejects every quote.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredVerifier;

#[async_trait]
impl QuoteVerifier for UnconfiguredVerifier {
    async fn verify(&self, _input: &VerifierInput) -> Result<String, TrustError> {
        Err(TrustError::verification("no quote validator configured"))
    }
}
