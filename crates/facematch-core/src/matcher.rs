//! Exact nearest-neighbor matching over the registry.
//!
//! A linear scan is fine here: registries hold a few hundred identities
//! at most, so O(N·D) per query is cheaper than maintaining an index.

use crate::registry::EmbeddingRegistry;
use crate::types::{Embedding, MatchResult};

/// Maximum Euclidean distance accepted as a match unless configured otherwise.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Strategy for finding the registered identity closest to a query embedding.
pub trait Matcher {
    /// Returns `None` when the registry is empty or the closest entry is
    /// not strictly closer than `threshold`.
    fn find(
        &self,
        query: &Embedding,
        registry: &EmbeddingRegistry,
        threshold: f32,
    ) -> Option<MatchResult>;
}

/// Euclidean nearest neighbor. On equal distances the first entry in
/// registry order wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestNeighborMatcher;

impl Matcher for NearestNeighborMatcher {
    fn find(
        &self,
        query: &Embedding,
        registry: &EmbeddingRegistry,
        threshold: f32,
    ) -> Option<MatchResult> {
        let mut best: Option<(&str, f32)> = None;

        for (name, stored) in registry.entries() {
            if stored.dim() != query.dim() {
                tracing::warn!(
                    name,
                    expected = query.dim(),
                    actual = stored.dim(),
                    "skipping registry entry with mismatched embedding dimension"
                );
                continue;
            }
            let distance = query.euclidean_distance(stored);
            if !distance.is_finite() {
                tracing::warn!(name, "skipping registry entry with non-finite distance");
                continue;
            }
            let closer = match best {
                None => true,
                Some((_, best_distance)) => distance < best_distance,
            };
            if closer {
                best = Some((name, distance));
            }
        }

        let (name, distance) = best?;
        tracing::debug!(name, distance, threshold, "nearest registry entry");

        if distance < threshold {
            Some(MatchResult {
                name: name.to_string(),
                confidence: confidence_for(distance),
                distance,
            })
        } else {
            None
        }
    }
}

/// Linear, clamped transform of a distance into a display confidence.
pub fn confidence_for(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}
