use std::collections::HashMap;

use crate::error::ProviderError;
use crate::provider::{EmbeddingProvider, MatchPolicy};
use crate::types::Embedding;

/// Provider answering from a fixed table of image bytes → embeddings.
pub struct ScriptedProvider {
    faces: HashMap<Vec<u8>, Vec<Embedding>>,
    policy: MatchPolicy,
}

impl ScriptedProvider {
    pub fn new(similarity_threshold: f32) -> Self {
        Self { faces: HashMap::new(), policy: MatchPolicy::new(similarity_threshold) }
    }

    pub fn with(mut self, image: &[u8], faces: &[&[f32]]) -> Self {
        let faces = faces.iter().map(|v| Embedding::new(v.to_vec())).collect();
        self.faces.insert(image.to_vec(), faces);
        self
    }
}

impl EmbeddingProvider for ScriptedProvider {
    fn embed(&self, image: &[u8]) -> Result<Vec<Embedding>, ProviderError> {
        self.faces.get(image).cloned().ok_or(ProviderError::Unavailable)
    }

    fn is_match(&self, known: &Embedding, candidate: &Embedding) -> bool {
        self.policy.is_match(known, candidate)
    }
}
