//! Embedding provider: image bytes in, one embedding per detected face out.

use std::path::Path;
use std::sync::Mutex;

use crate::detector::FaceDetector;
use crate::error::ProviderError;
use crate::recognizer::FaceRecognizer;
use crate::types::Embedding;

/// Default cosine similarity threshold for w600k_r50 embeddings.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.40;

/// Source of face embeddings and of the match decision between two of them.
///
/// `distance` and `is_match` are independent quantities: the reported distance
/// never decides whether an identity matches.
pub trait EmbeddingProvider: Send + Sync {
    /// Embeddings for every face in the image, most confident detection first.
    fn embed(&self, image: &[u8]) -> Result<Vec<Embedding>, ProviderError>;

    fn is_match(&self, known: &Embedding, candidate: &Embedding) -> bool;

    fn distance(&self, known: &Embedding, candidate: &Embedding) -> f32 {
        known.euclidean_distance(candidate)
    }
}

/// Stateful inference backend, driven from a single thread at a time.
pub trait Analyzer: Send + 'static {
    fn analyze(&mut self, image: &[u8]) -> Result<Vec<Embedding>, ProviderError>;
}

/// Match decision by cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    pub similarity_threshold: f32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self { similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD }
    }
}

impl MatchPolicy {
    pub fn new(similarity_threshold: f32) -> Self {
        Self { similarity_threshold }
    }

    pub fn is_match(&self, known: &Embedding, candidate: &Embedding) -> bool {
        known.similarity(candidate) >= self.similarity_threshold
    }
}

/// SCRFD detection followed by ArcFace extraction for each face.
pub struct FaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FaceAnalyzer {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }

    /// Load `det_10g.onnx` and `w600k_r50.onnx` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ProviderError> {
        let detector = FaceDetector::load(&model_path(model_dir, "det_10g.onnx"))?;
        let recognizer = FaceRecognizer::load(&model_path(model_dir, "w600k_r50.onnx"))?;
        Ok(Self::new(detector, recognizer))
    }
}

fn model_path(dir: &Path, file: &str) -> String {
    dir.join(file).to_string_lossy().into_owned()
}

impl Analyzer for FaceAnalyzer {
    fn analyze(&mut self, image: &[u8]) -> Result<Vec<Embedding>, ProviderError> {
        let decoded = image::load_from_memory(image)?.to_rgb8();
        let faces = self.detector.detect(&decoded)?;
        tracing::debug!(
            width = decoded.width(),
            height = decoded.height(),
            faces = faces.len(),
            "faces detected"
        );

        let mut embeddings = Vec::with_capacity(faces.len());
        for face in &faces {
            embeddings.push(self.recognizer.extract(&decoded, face)?);
        }
        Ok(embeddings)
    }
}

/// In-process provider: one analyzer behind a mutex.
pub struct LocalProvider<A> {
    analyzer: Mutex<A>,
    policy: MatchPolicy,
}

impl<A: Analyzer> LocalProvider<A> {
    pub fn new(analyzer: A, policy: MatchPolicy) -> Self {
        Self { analyzer: Mutex::new(analyzer), policy }
    }
}

impl<A: Analyzer> EmbeddingProvider for LocalProvider<A> {
    fn embed(&self, image: &[u8]) -> Result<Vec<Embedding>, ProviderError> {
        let mut analyzer = self.analyzer.lock().unwrap_or_else(|e| e.into_inner());
        analyzer.analyze(image)
    }

    fn is_match(&self, known: &Embedding, candidate: &Embedding) -> bool {
        self.policy.is_match(known, candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Embedding>);

    impl Analyzer for Fixed {
        fn analyze(&mut self, _image: &[u8]) -> Result<Vec<Embedding>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_match_policy_threshold() {
        let policy = MatchPolicy::new(0.5);
        let a = Embedding::new(vec![1.0, 0.0]);
        let close = Embedding::new(vec![0.9, 0.1]);
        let far = Embedding::new(vec![0.0, 1.0]);
        assert!(policy.is_match(&a, &close));
        assert!(!policy.is_match(&a, &far));
    }

    #[test]
    fn test_local_provider_delegates() {
        let provider = LocalProvider::new(
            Fixed(vec![Embedding::new(vec![1.0, 0.0])]),
            MatchPolicy::default(),
        );
        let faces = provider.embed(b"ignored").unwrap();
        assert_eq!(faces.len(), 1);
        let d = provider.distance(&faces[0], &Embedding::new(vec![0.0, 0.0]));
        assert!((d - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_missing_models() {
        let err = FaceAnalyzer::load(Path::new("/nonexistent")).err();
        assert!(matches!(err, Some(ProviderError::Detector(_))));
    }
}
