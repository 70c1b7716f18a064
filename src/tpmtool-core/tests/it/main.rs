//! Consolidated integration tests for tpmtool-core.
//!
//! One test binary keeps proptest suites from running as separate
//! processes in parallel.

mod common;
mod engine;
mod session;
