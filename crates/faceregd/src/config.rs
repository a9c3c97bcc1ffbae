use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use facereg_core::{EnrollOptions, MatchPolicy, ReconcilePolicy};

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:8080).
    pub bind: SocketAddr,
    /// Directory holding one `<label>.jpg` per enrolled face.
    pub faces_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub match_threshold: f32,
    /// Upper bound on one embedding computation.
    pub embed_timeout: Duration,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
    /// Skip unusable stored images at startup instead of refusing to start.
    pub skip_invalid_on_startup: bool,
    /// Delete the saved image when an enroll fails.
    pub rollback_failed_enroll: bool,
}

impl Config {
    /// Load configuration from `FACEREG_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = facereg_core::default_data_dir();

        Self {
            bind: parsed(&var, "FACEREG_BIND", SocketAddr::from(([0, 0, 0, 0], 8080))),
            faces_dir: var("FACEREG_FACES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("faces")),
            model_dir: var("FACEREG_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facereg_core::default_model_dir),
            match_threshold: parsed(
                &var,
                "FACEREG_MATCH_THRESHOLD",
                facereg_core::provider::DEFAULT_SIMILARITY_THRESHOLD,
            ),
            embed_timeout: Duration::from_secs(parsed(&var, "FACEREG_EMBED_TIMEOUT_SECS", 30)),
            max_upload_bytes: parsed(&var, "FACEREG_MAX_UPLOAD_BYTES", 16 * 1024 * 1024),
            skip_invalid_on_startup: flag(&var, "FACEREG_SKIP_INVALID_ON_STARTUP"),
            rollback_failed_enroll: flag(&var, "FACEREG_ROLLBACK_FAILED_ENROLL"),
        }
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy::new(self.match_threshold)
    }

    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        if self.skip_invalid_on_startup {
            ReconcilePolicy::SkipInvalid
        } else {
            ReconcilePolicy::Abort
        }
    }

    pub fn enroll_options(&self) -> EnrollOptions {
        EnrollOptions { rollback_on_failure: self.rollback_failed_enroll }
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable setting, using default");
            default
        }),
        None => default,
    }
}

fn flag(var: &impl Fn(&str) -> Option<String>, key: &str) -> bool {
    var(key).map(|v| v != "0" && !v.is_empty()).unwrap_or(false)
}
