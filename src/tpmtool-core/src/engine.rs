//! Attestation orchestration.
//!
//! One verification round runs strictly in sequence:
//! 1. Snapshot the selected device from the store
//! 2. Decode the scanned envelope
//! 3. Validate the quote through the external verifier
//! 4. Extract register maps from the new quote and the stored baseline
//! 5. Compare and classify
//!
//! Every failure in steps 2-5 ends the round as `FAILED` and leaves the
//! device record untouched. Only store failures are returned as errors.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::compare::compare;
use crate::config::TrustConfig;
use crate::device::{Device, DeviceId};
use crate::envelope::QuoteEnvelope;
use crate::error::{ErrorCategory, TrustError};
use crate::measurement::extract;
use crate::nonce::{unix_now, Nonce};
use crate::store::{DeviceStore, JsonFileStore, MemoryDeviceStore};
use crate::types::AttestationResult;
use crate::verifier::{CommandVerifier, QuoteVerifier, UnconfiguredVerifier, VerifierInput};

/// Sequences envelope decoding, quote validation and baseline comparison.
pub struct AttestationEngine {
    store: Arc<dyn DeviceStore>,
    verifier: Arc<dyn QuoteVerifier>,
}

impl AttestationEngine {
    /// Create an engine over an injected store and verifier.
    pub fn new(store: Arc<dyn DeviceStore>, verifier: Arc<dyn QuoteVerifier>) -> Self {
        Self { store, verifier }
    }

    /// Build the store and verifier described by `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the configured store file cannot be opened.
    pub async fn from_config(config: &TrustConfig) -> Result<Self, TrustError> {
        let store: Arc<dyn DeviceStore> = match &config.store_path {
            Some(path) => Arc::new(JsonFileStore::open(path).await?),
            None => {
                warn!("AttestationEngine: no store file configured, baselines will not persist");
                Arc::new(MemoryDeviceStore::new())
            },
        };

        let verifier: Arc<dyn QuoteVerifier> = match &config.verifier_program {
            Some(program) => Arc::new(
                CommandVerifier::new(program).with_args(config.verifier_args.clone()),
            ),
            None => Arc::new(UnconfiguredVerifier),
        };

        Ok(Self::new(store, verifier))
    }

    /// The device store this engine reads from.
    pub fn store(&self) -> Arc<dyn DeviceStore> {
        Arc::clone(&self.store)
    }

    /// Run one verification round.
    ///
    /// `device_id` and `input` mirror what the caller may or may not have
    /// (no selection, aborted scan); both cases produce a `FAILED` result.
    ///
    /// # Errors
    ///
    /// Only if the store cannot be read.
    #[instrument(skip(self, input, nonce), fields(device_id = ?device_id))]
    pub async fn attest(
        &self,
        device_id: Option<DeviceId>,
        input: Option<&str>,
        nonce: &Nonce,
    ) -> Result<AttestationResult, TrustError> {
        let Some(device_id) = device_id else {
            return Ok(fail(TrustError::NoDeviceSelected, None));
        };

        let Some(device) = self.store.get_by_id(device_id).await? else {
            return Ok(fail(TrustError::DeviceNotFound { id: device_id }, None));
        };

        let Some(input) = input else {
            return Ok(fail(TrustError::ScanFailed, Some(device)));
        };

        Ok(self.verify_snapshot(device, input, nonce).await)
    }

    /// Run steps 2-5 against a device snapshot.
    pub async fn verify_snapshot(
        &self,
        device: Device,
        input: &str,
        nonce: &Nonce,
    ) -> AttestationResult {
        match self.classify(&device, input, nonce).await {
            Ok(result) => result,
            Err(e) => fail(e, Some(device)),
        }
    }

    async fn classify(
        &self,
        device: &Device,
        input: &str,
        nonce: &Nonce,
    ) -> Result<AttestationResult, TrustError> {
        let envelope = QuoteEnvelope::parse(input)?;
        debug!(
            signature_len = envelope.signature.len(),
            message_len = envelope.message.len(),
            pcr_len = envelope.pcr_digest.len(),
            "Envelope decoded"
        );

        let public_key = device.public_key_bytes().map_err(|e| {
            warn!(device_id = device.id, "Stored public key is not valid base64");
            e
        })?;

        let raw = self
            .verifier
            .verify(&VerifierInput::new(public_key, envelope, nonce))
            .await?;

        let new_registers = extract(&raw)?;
        let old_registers = extract(&device.baseline).map_err(|e| {
            warn!(
                baseline_fingerprint = %baseline_fingerprint(&device.baseline),
                "Stored baseline is not a valid quote document"
            );
            e
        })?;

        let (differences, changed) = compare(&old_registers, &new_registers);
        let document = pretty_document(&raw)?;

        if changed || !device.has_baseline() {
            info!(
                changed_registers = ?differences.indices(),
                first_use = !device.has_baseline(),
                "Attestation: registers changed"
            );
            Ok(AttestationResult::changed(document, differences, device.clone()))
        } else {
            info!(
                registers = new_registers.len(),
                baseline_fingerprint = %baseline_fingerprint(&device.baseline),
                "Attestation: registers match baseline"
            );
            Ok(AttestationResult::ok(document, device.clone()))
        }
    }

    /// Make a `CHANGED` result's quote the device's new baseline.
    ///
    /// Any other result kind is ignored and `Ok(None)` is returned. The device
    /// is re-read first so edits made during review are kept.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` if the device was deleted meanwhile, `Persistence` if
    /// the store refuses the update.
    #[instrument(skip(self, result), fields(kind = %result.kind))]
    pub async fn accept_changes(
        &self,
        result: &AttestationResult,
    ) -> Result<Option<Device>, TrustError> {
        let Some(reviewed) = result.device.as_ref().filter(|_| result.is_acceptable()) else {
            warn!("accept_changes: result carries no trust decision, ignoring");
            return Ok(None);
        };

        let mut device = self
            .store
            .get_by_id(reviewed.id)
            .await?
            .ok_or(TrustError::DeviceNotFound { id: reviewed.id })?;

        if device.baseline != reviewed.baseline {
            warn!(
                device_id = device.id,
                "accept_changes: baseline was replaced while the result was under review"
            );
        }

        device.baseline = result.quote_document.clone();
        device.last_success = Some(unix_now());

        if !self.store.update(&device).await? {
            return Err(TrustError::persistence("Failed to save attestation changes"));
        }

        info!(
            device_id = device.id,
            baseline_fingerprint = %baseline_fingerprint(&device.baseline),
            "New baseline accepted"
        );
        Ok(Some(device))
    }

    /// Show the stored baseline of a device without verifying anything.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound`, or `Persistence` if the store cannot be read.
    pub async fn view_last_result(&self, device_id: DeviceId) -> Result<AttestationResult, TrustError> {
        let device = self
            .store
            .get_by_id(device_id)
            .await?
            .ok_or(TrustError::DeviceNotFound { id: device_id })?;
        Ok(AttestationResult::replay(device))
    }
}

/// Log a failed round under its category and build the result.
fn fail(error: TrustError, device: Option<Device>) -> AttestationResult {
    let category = error.category();
    match category {
        ErrorCategory::Input => debug!(category = category.as_str(), "Attestation rejected: {}", error),
        _ => warn!(category = category.as_str(), "Attestation failed: {}", error),
    }
    AttestationResult::failed(error.to_string(), device)
}

/// Re-serialize the validator output as 2-space indented JSON.
fn pretty_document(raw: &str) -> Result<String, TrustError> {
    serde_json::from_str::<serde_json::Value>(raw)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .map_err(|e| TrustError::malformed_quote(format!("invalid JSON: {e}")))
}

/// Short SHA-256 fingerprint of a quote document, for logs.
pub fn baseline_fingerprint(document: &str) -> String {
    if document.is_empty() {
        return "none".to_string();
    }
    let digest = Sha256::digest(document.as_bytes());
    hex::encode(&digest[..8])
}
