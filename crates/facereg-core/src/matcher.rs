//! Nearest-identity lookup of query faces against a registry snapshot.

use crate::provider::EmbeddingProvider;
use crate::registry::Snapshot;
use crate::types::{Embedding, FaceMatch, Recognition};

/// Every registry entry the provider judges a match for `probe`, with its distance.
///
/// All entries are reported, not just the closest; order follows the snapshot.
pub fn matches_for(
    provider: &dyn EmbeddingProvider,
    probe: &Embedding,
    gallery: &Snapshot,
) -> Vec<FaceMatch> {
    gallery
        .iter()
        .filter(|(_, known)| provider.is_match(known, probe))
        .map(|(label, known)| FaceMatch {
            id: label.clone(),
            dist: provider.distance(known, probe),
        })
        .collect()
}

/// Evaluate each query face independently against the same snapshot.
pub fn recognize_faces(
    provider: &dyn EmbeddingProvider,
    probes: &[Embedding],
    gallery: &Snapshot,
) -> Recognition {
    let faces: Vec<FaceMatch> = probes
        .iter()
        .flat_map(|probe| matches_for(provider, probe, gallery))
        .collect();

    tracing::debug!(
        count = probes.len(),
        gallery = gallery.len(),
        matches = faces.len(),
        "recognition evaluated"
    );

    Recognition { count: probes.len(), faces }
}
