//! # tpmtool-core
//!
//! Trust-on-first-use continuity checks for remote TPM devices.
//!
//! A device is registered with its attestation public key. Each round the
//! device presents a signed quote over its PCRs; the quote is validated,
//! its registers are compared to the last accepted baseline, and the
//! outcome is classified for a human to accept or reject.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AttestationEngine                         │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │ QuoteEnvelope│  │ QuoteVerifier│  │ DeviceStore  │      │
//! │  │ (sig|msg|pcr)│  │ (external)   │  │ (snapshot)   │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │              measurement::extract                 │      │
//! │  │        (new quote + stored baseline)              │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │              compare::compare                     │      │
//! │  │        OK | CHANGED | FAILED (| REPLAY)           │      │
//! │  └──────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Trust Properties
//!
//! - **No silent first use**: a device without baseline never yields `OK`
//! - **No hidden drops**: a register missing from a new quote is a change
//! - **Explicit acceptance**: only a reviewed `CHANGED` result moves the baseline
//! - **Fresh challenges**: the nonce is replaced after every attempt unless pinned

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod compare;
pub mod config;
pub mod device;
pub mod devices;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod measurement;
pub mod nonce;
pub mod session;
pub mod store;
pub mod types;
pub mod verifier;

pub use compare::{compare, Difference, DifferenceSet};
pub use config::TrustConfig;
pub use device::{validate_registration, Device, DeviceId};
pub use devices::DeviceManager;
pub use engine::{baseline_fingerprint, AttestationEngine};
pub use envelope::QuoteEnvelope;
pub use error::{ErrorCategory, TrustError};
pub use measurement::{extract, RegisterMap};
pub use nonce::Nonce;
pub use session::Session;
pub use store::{DeviceStore, JsonFileStore, MemoryDeviceStore};
pub use types::{AttestationResult, ResultKind};
pub use verifier::{CommandVerifier, QuoteVerifier, UnconfiguredVerifier, VerifierInput};
