//! PCR measurement extraction from validator quote documents.
//!
//! Expected document shape:
//!
//! ```text
//! {
//!   "PCRValues": { "0": "<hex>", "7": "<hex>", ... },
//!   "TPMData": { "Attested": { "Quote": { "PcrSelect": {
//!     "PcrSelections": [ { "PcrSelect": [0, 7, ...] } ]
//!   } } } }
//! }
//! ```
//!
//! Only registers listed in the first selection group are extracted. Nothing
//! in the document is trusted to be present.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::TrustError;

/// PCR index to measurement value.
pub type RegisterMap = BTreeMap<u32, String>;

/// Build the register map for a quote document.
///
/// An empty document yields an empty map; that is the baseline of a device
/// that was never attested.
///
/// # Errors
///
/// `MalformedQuote` for invalid JSON, a missing or mistyped node on the
/// selection path, or a selected register without a value.
pub fn extract(document: &str) -> Result<RegisterMap, TrustError> {
    let mut registers = RegisterMap::new();
    if document.is_empty() {
        return Ok(registers);
    }

    let root: Value = serde_json::from_str(document)
        .map_err(|e| TrustError::malformed_quote(format!("invalid JSON: {e}")))?;
    let root = as_object(&root, "document root")?;

    let values = as_object(field(root, "PCRValues")?, "PCRValues")?;

    let quote = as_object(field(root, "TPMData")?, "TPMData")
        .and_then(|o| as_object(field(o, "Attested")?, "Attested"))
        .and_then(|o| as_object(field(o, "Quote")?, "Quote"))
        .and_then(|o| as_object(field(o, "PcrSelect")?, "PcrSelect"))?;
    let groups = as_array(field(quote, "PcrSelections")?, "PcrSelections")?;
    let first_group = groups
        .first()
        .ok_or_else(|| TrustError::malformed_quote("PcrSelections is empty"))
        .and_then(|g| as_object(g, "PcrSelections[0]"))?;
    let selected = as_array(field(first_group, "PcrSelect")?, "PcrSelections[0].PcrSelect")?;

    for entry in selected {
        let index = entry
            .as_u64()
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| {
                TrustError::malformed_quote(format!("selected PCR {entry} is not an index"))
            })?;
        let value = values
            .get(&index.to_string())
            .ok_or_else(|| TrustError::malformed_quote(format!("no value for PCR {index}")))?
            .as_str()
            .ok_or_else(|| {
                TrustError::malformed_quote(format!("value for PCR {index} is not a string"))
            })?;
        registers.insert(index, value.to_string());
    }

    Ok(registers)
}

fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a Value, TrustError> {
    object
        .get(key)
        .ok_or_else(|| TrustError::malformed_quote(format!("missing {key}")))
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, TrustError> {
    value
        .as_object()
        .ok_or_else(|| TrustError::malformed_quote(format!("{what} is not an object")))
}

fn as_array<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>, TrustError> {
    value
        .as_array()
        .ok_or_else(|| TrustError::malformed_quote(format!("{what} is not an array")))
}
