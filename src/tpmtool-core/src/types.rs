//! Attestation outcome types handed to the caller for review.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compare::DifferenceSet;
use crate::device::Device;

/// Classification of one attestation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultKind {
    /// Verified, and the registers match a non-empty baseline.
    Ok,
    /// Verified, but registers differ from the baseline (or there is none).
    Changed,
    /// Decoding, verification or schema error.
    Failed,
    /// Display of the stored baseline; no verification took place.
    Replay,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Changed => "CHANGED",
            Self::Failed => "FAILED",
            Self::Replay => "REPLAY",
        })
    }
}

/// Result of an attestation round, kept only while the user reviews it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResult {
    /// Outcome.
    pub kind: ResultKind,
    /// Quote document (pretty JSON). Empty for `Failed`.
    pub quote_document: String,
    /// Human-readable reason, only for `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Changed registers, only for `Changed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub differences: Option<DifferenceSet>,
    /// Snapshot of the device this result belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
}

impl AttestationResult {
    /// A failed round.
    pub fn failed(reason: impl Into<String>, device: Option<Device>) -> Self {
        Self {
            kind: ResultKind::Failed,
            quote_document: String::new(),
            failure_reason: Some(reason.into()),
            differences: None,
            device,
        }
    }

    /// A verified round with no register changes.
    pub fn ok(quote_document: String, device: Device) -> Self {
        Self {
            kind: ResultKind::Ok,
            quote_document,
            failure_reason: None,
            differences: None,
            device: Some(device),
        }
    }

    /// A verified round whose registers differ from the baseline.
    pub fn changed(quote_document: String, differences: DifferenceSet, device: Device) -> Self {
        Self {
            kind: ResultKind::Changed,
            quote_document,
            failure_reason: None,
            differences: Some(differences),
            device: Some(device),
        }
    }

    /// Display of the device's stored baseline.
    pub fn replay(device: Device) -> Self {
        Self {
            kind: ResultKind::Replay,
            quote_document: device.baseline.clone(),
            failure_reason: None,
            differences: None,
            device: Some(device),
        }
    }

    /// Only `Changed` results can become the new baseline.
    pub fn is_acceptable(&self) -> bool {
        self.kind == ResultKind::Changed && self.device.is_some()
    }
}
