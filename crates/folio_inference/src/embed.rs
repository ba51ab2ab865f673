//! The embedding collaborator contract.

use async_trait::async_trait;

use crate::lm::InferenceError;
use folio_protocol::ConceptIri;

/// One nearest-neighbor hit from the pre-built label index.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestHit {
    pub iri: ConceptIri,
    pub label: String,
    pub score: f64,
}

/// Pre-built nearest-neighbor index over all concept labels, plus pairwise
/// similarity. Absence of this collaborator degrades the reconciler and
/// resolver to lexical-only behavior.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;

    /// Pairwise similarity in [-1, 1]. Default is cosine over the raw
    /// vectors; remote indexes may override.
    async fn similarity(&self, a: &[f32], b: &[f32]) -> Result<f64, InferenceError> {
        Ok(cosine_similarity(a, b))
    }

    /// Top-k semantic query over the whole label index.
    async fn nearest(&self, text: &str, k: usize) -> Result<Vec<NearestHit>, InferenceError>;

    /// Top-k semantic query restricted to the given candidates.
    async fn nearest_in(
        &self,
        text: &str,
        candidate_iris: &[ConceptIri],
        k: usize,
    ) -> Result<Vec<NearestHit>, InferenceError>;
}

/// Cosine similarity in [-1, 1]. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
