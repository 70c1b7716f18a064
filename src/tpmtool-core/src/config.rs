//! Configuration for the attestation engine and its collaborators.

use std::path::PathBuf;

/// Environment variable naming the device store file.
pub const ENV_STORE: &str = "TPMTOOL_STORE";
/// Environment variable naming the external quote validator.
pub const ENV_VERIFIER: &str = "TPMTOOL_VERIFIER";
/// Environment variable with whitespace-separated leading validator arguments.
pub const ENV_VERIFIER_ARGS: &str = "TPMTOOL_VERIFIER_ARGS";
/// Environment variable pinning a custom nonce.
pub const ENV_NONCE: &str = "TPMTOOL_NONCE";

/// Configuration for tpmtool.
#[derive(Debug, Clone, Default)]
pub struct TrustConfig {
    /// JSON file holding the registered devices (`None` keeps them in memory).
    pub store_path: Option<PathBuf>,
    /// External quote validator executable.
    pub verifier_program: Option<PathBuf>,
    /// Extra arguments placed before the generated validator arguments.
    pub verifier_args: Vec<String>,
    /// User-pinned nonce. Replaces the generated challenge on every round.
    pub pinned_nonce: Option<String>,
}

impl TrustConfig {
    /// Defaults overlaid with `TPMTOOL_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`TrustConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            store_path: non_blank(ENV_STORE).map(PathBuf::from),
            verifier_program: non_blank(ENV_VERIFIER).map(PathBuf::from),
            verifier_args: non_blank(ENV_VERIFIER_ARGS)
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            pinned_nonce: non_blank(ENV_NONCE),
        }
    }
}
