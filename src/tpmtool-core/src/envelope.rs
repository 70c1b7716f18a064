//! Scanned quote envelope: `signature|message|pcrDigest`, each base64.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::TrustError;

/// Field separator in the scanned payload.
pub const FIELD_SEPARATOR: char = '|';

/// Standard alphabet; trailing `=` padding is optional on decode.
const FIELD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The three decoded components of a scanned quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteEnvelope {
    /// Quote signature.
    pub signature: Vec<u8>,
    /// Signed TPMS_ATTEST message.
    pub message: Vec<u8>,
    /// Marshalled PCR digest structure.
    pub pcr_digest: Vec<u8>,
}

impl QuoteEnvelope {
    /// Split and decode a scanned payload.
    ///
    /// # Errors
    ///
    /// `MalformedEnvelope` unless there are exactly three fields,
    /// `InvalidEncoding` if a trimmed field is not standard-alphabet base64
    /// (padding optional).
    pub fn parse(raw: &str) -> Result<Self, TrustError> {
        let fields: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
        let [signature, message, pcr_digest] = fields.as_slice() else {
            return Err(TrustError::MalformedEnvelope {
                fields: fields.len(),
            });
        };

        Ok(Self {
            signature: decode_field("signature", signature)?,
            message: decode_field("message", message)?,
            pcr_digest: decode_field("pcr digest", pcr_digest)?,
        })
    }
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>, TrustError> {
    FIELD_ENGINE
        .decode(value.trim())
        .map_err(|e| TrustError::InvalidEncoding {
            field,
            reason: e.to_string(),
        })
}
