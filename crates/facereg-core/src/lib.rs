//! Face identity registry.
//!
//! Keeps an in-memory map from identity label to ArcFace embedding, backed by
//! one image per identity on disk, and answers "who is this" queries against
//! it. Embeddings come from SCRFD detection plus ArcFace recognition running
//! on ONNX Runtime.

pub mod alignment;
pub mod detector;
pub mod error;
pub mod matcher;
pub mod provider;
pub mod recognizer;
pub mod reconcile;
pub mod registry;
pub mod storage;
pub mod types;
pub mod upload;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

use std::path::PathBuf;

pub use error::{ProviderError, RegistryError, RegistryResult};
pub use provider::{Analyzer, EmbeddingProvider, FaceAnalyzer, LocalProvider, MatchPolicy};
pub use reconcile::{ReconcilePolicy, ReconcileReport};
pub use registry::{RegistryStore, Snapshot};
pub use storage::ImageDir;
pub use types::{BoundingBox, Embedding, FaceMatch, Recognition};
pub use upload::ImageUpload;
pub use workflow::{EnrollOptions, FaceRegistry};

/// Per-user data directory for facereg: `$XDG_DATA_HOME/facereg`, falling back
/// to `~/.local/share/facereg`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facereg")
}

/// Where `det_10g.onnx` and `w600k_r50.onnx` are looked up by default.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}
