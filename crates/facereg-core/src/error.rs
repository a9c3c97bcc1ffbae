use std::path::PathBuf;
use thiserror::Error;

use crate::detector::DetectorError;
use crate::recognizer::RecognizerError;

/// Failures of the embedding provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("embedding timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("embedding engine is not running")]
    Unavailable,
}

/// Errors of registry workflows.
///
/// The first group is caller-facing (bad input or bad state requested by the
/// caller); the rest are internal failures.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Identifier for the face was not given!")]
    MissingIdentifier,
    #[error("Identifier '{0}' cannot be used as a face name")]
    InvalidIdentifier(String),
    #[error("Given file is invalid!")]
    InvalidFile,
    #[error("No faces were detected in the image.")]
    NoFaceDetected,
    #[error("Found more than one face in the image.")]
    MultipleFaces { count: usize },
    #[error("No face registered under identifier '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    /// Whether the error was caused by the request rather than the service.
    ///
    /// An upload that is not a decodable image is the caller's fault; every
    /// other provider failure is ours.
    pub fn is_client_error(&self) -> bool {
        match self {
            RegistryError::Provider(ProviderError::Decode(_)) => true,
            RegistryError::Provider(_) | RegistryError::Io { .. } => false,
            _ => true,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
