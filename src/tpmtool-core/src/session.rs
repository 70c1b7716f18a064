//! Interactive attestation session.
//!
//! Tracks what a user interface would: the selected device, the challenge
//! nonce shown to the user and the result currently under review. The nonce
//! is replaced after every attempt unless the user pinned a custom value.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::TrustConfig;
use crate::device::{Device, DeviceId};
use crate::engine::AttestationEngine;
use crate::error::TrustError;
use crate::nonce::Nonce;
use crate::types::AttestationResult;

/// State of one user's attestation workflow.
pub struct Session {
    engine: Arc<AttestationEngine>,
    nonce: Nonce,
    pinned: bool,
    selected: Option<DeviceId>,
    last_result: Option<AttestationResult>,
}

impl Session {
    /// Start a session with a freshly generated nonce.
    pub fn new(engine: Arc<AttestationEngine>) -> Self {
        Self {
            engine,
            nonce: Nonce::generate(),
            pinned: false,
            selected: None,
            last_result: None,
        }
    }

    /// Start a session honouring the configured nonce pin.
    pub fn from_config(engine: Arc<AttestationEngine>, config: &TrustConfig) -> Self {
        let mut session = Self::new(engine);
        if let Some(pin) = &config.pinned_nonce {
            session.set_nonce(pin);
        }
        session
    }

    /// The challenge for the next attempt.
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Whether the user pinned the nonce.
    pub fn is_nonce_pinned(&self) -> bool {
        self.pinned
    }

    /// Pin a custom nonce, or unpin and regenerate when `value` is blank.
    ///
    /// A pinned nonce is reused for every attempt, which gives up replay
    /// protection. It is an explicit user override.
    pub fn set_nonce(&mut self, value: &str) {
        if value.trim().is_empty() {
            self.pinned = false;
            self.nonce = Nonce::generate();
        } else {
            warn!("Session: nonce pinned by user, replay protection disabled");
            self.pinned = true;
            self.nonce = Nonce::custom(value);
        }
    }

    /// Currently selected device id.
    pub fn selected(&self) -> Option<DeviceId> {
        self.selected
    }

    /// Select a device for the next attempt.
    pub fn select(&mut self, device: &Device) {
        self.selected = Some(device.id);
    }

    /// Reconcile the selection with a refreshed device list.
    ///
    /// A selection that vanished is dropped; with no selection the first
    /// device is picked.
    pub fn refresh(&mut self, devices: &[Device]) {
        if let Some(id) = self.selected {
            if !devices.iter().any(|d| d.id == id) {
                debug!(device_id = id, "Session: selected device disappeared");
                self.selected = None;
            }
        }
        if self.selected.is_none() {
            self.selected = devices.first().map(|d| d.id);
        }
    }

    /// Result currently under review.
    pub fn last_result(&self) -> Option<&AttestationResult> {
        self.last_result.as_ref()
    }

    /// Verify a scanned quote for the selected device.
    ///
    /// The nonce is consumed whatever the outcome.
    ///
    /// # Errors
    ///
    /// Only store failures.
    pub async fn attest(&mut self, input: Option<&str>) -> Result<&AttestationResult, TrustError> {
        let outcome = self.engine.attest(self.selected, input, &self.nonce).await;
        self.rotate_nonce();
        Ok(self.last_result.insert(outcome?))
    }

    /// Accept the result under review as the new baseline.
    ///
    /// Returns the updated device, or `None` when the result under review
    /// is not a `CHANGED` result.
    pub async fn accept_last(&mut self) -> Result<Option<Device>, TrustError> {
        let Some(result) = self.last_result.as_ref() else {
            return Ok(None);
        };
        let accepted = self.engine.accept_changes(result).await?;
        if accepted.is_some() {
            self.last_result = None;
        }
        Ok(accepted)
    }

    /// Review the selected device's stored baseline.
    pub async fn view_last_result(&mut self) -> Result<&AttestationResult, TrustError> {
        let id = self.selected.ok_or(TrustError::NoDeviceSelected)?;
        let replay = self.engine.view_last_result(id).await?;
        Ok(self.last_result.insert(replay))
    }

    /// Leave the result review.
    pub fn dismiss(&mut self) {
        self.last_result = None;
    }

    fn rotate_nonce(&mut self) {
        if !self.pinned {
            self.nonce = Nonce::generate();
        }
    }
}
