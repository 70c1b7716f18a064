//! Shared fixtures: a scripted quote verifier and quote documents.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use tpmtool_core::{
    AttestationEngine, Device, DeviceStore, MemoryDeviceStore, QuoteVerifier, TrustError,
    VerifierInput,
};

/// Attestation public key used by every test device.
pub const PUBLIC_KEY: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAE";

/// A well-formed scanned payload (`sig|msg|pcr`).
pub const SCAN: &str = "c2ln|bXNn|cGNy";

/// Verifier that replays queued outcomes and records its inputs.
#[derive(Default)]
pub struct ScriptedVerifier {
    outcomes: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<VerifierInput>>,
}

impl ScriptedVerifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_document(&self, document: String) {
        self.outcomes.lock().unwrap().push_back(Ok(document));
    }

    pub fn push_failure(&self, reason: &str) {
        self.outcomes.lock().unwrap().push_back(Err(reason.to_string()));
    }

    pub fn calls(&self) -> Vec<VerifierInput> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteVerifier for ScriptedVerifier {
    async fn verify(&self, input: &VerifierInput) -> Result<String, TrustError> {
        self.calls.lock().unwrap().push(input.clone());
        match self.outcomes.lock().unwrap().pop_front() {
            Some(Ok(document)) => Ok(document),
            Some(Err(reason)) => Err(TrustError::VerificationFailed { reason }),
            None => Err(TrustError::verification("no scripted outcome")),
        }
    }
}

/// Quote document selecting exactly the given registers.
pub fn quote(registers: &[(u32, &str)]) -> String {
    let values: serde_json::Map<String, serde_json::Value> = registers
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    let selection: Vec<u32> = registers.iter().map(|(k, _)| *k).collect();
    json!({
        "PCRValues": values,
        "TPMData": { "Attested": { "Quote": { "PcrSelect": {
            "PcrSelections": [ { "Hash": 11, "PcrSelect": selection } ]
        } } } }
    })
    .to_string()
}

pub struct Harness {
    pub store: Arc<MemoryDeviceStore>,
    pub verifier: Arc<ScriptedVerifier>,
    pub engine: Arc<AttestationEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryDeviceStore::new());
        let verifier = ScriptedVerifier::new();
        let engine = Arc::new(AttestationEngine::new(store.clone(), verifier.clone()));
        Self {
            store,
            verifier,
            engine,
        }
    }

    /// Insert a device, optionally with a baseline already accepted.
    pub async fn device(&self, baseline: Option<String>) -> Device {
        let mut device = Device::new("router", PUBLIC_KEY);
        if let Some(doc) = baseline {
            device.baseline = doc;
            device.last_success = Some(1_700_000_000);
        }
        self.store.insert(device).await.unwrap()
    }
}
