//! Error taxonomy for the enrichment core.
//!
//! No error escapes the orchestrator: every stage maps its failures onto one
//! of these variants, and the orchestrator converts them into quality
//! signals or a terminal job state.

use thiserror::Error;

use crate::job::Stage;

pub type EnrichResult<T> = Result<T, EnrichError>;

#[derive(Debug, Error)]
pub enum EnrichError {
    /// Unsupported format, unparseable document, oversize input. Job fails
    /// with a descriptive reason; never retried.
    #[error("input error: {0}")]
    Input(String),

    /// LM timeout/5xx or embedding service unavailable. Retried once per
    /// call, then the stage degrades.
    #[error("transient dependency failure in {stage}: {message}")]
    TransientDependency { stage: Stage, message: String },

    /// Unknown IRI or unexpected ontology schema. The offending annotation
    /// is rejected with reason `unresolved_iri`, never silently dropped.
    #[error("ontology error for {iri}: {message}")]
    Ontology { iri: String, message: String },

    /// LM returned malformed structured output after the retry.
    #[error("schema error in {stage}: {message}")]
    Schema { stage: Stage, message: String },

    /// Cooperative cancellation. Partial outputs are preserved.
    #[error("cancelled")]
    Cancelled,

    /// Stage panic or anything not covered above.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl EnrichError {
    pub fn transient(stage: Stage, message: impl Into<String>) -> Self {
        Self::TransientDependency {
            stage,
            message: message.into(),
        }
    }

    pub fn schema(stage: Stage, message: impl Into<String>) -> Self {
        Self::Schema {
            stage,
            message: message.into(),
        }
    }

    pub fn ontology(iri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ontology {
            iri: iri.into(),
            message: message.into(),
        }
    }

    /// True for failures that degrade a stage rather than fail the job.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EnrichError::Input(_) | EnrichError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability_split() {
        assert!(!EnrichError::Input("too large".into()).is_recoverable());
        assert!(!EnrichError::Fatal("panic".into()).is_recoverable());
        assert!(EnrichError::Cancelled.is_recoverable());
        assert!(EnrichError::transient(Stage::Reranker, "timeout").is_recoverable());
    }

    #[test]
    fn test_display_carries_stage() {
        let err = EnrichError::schema(Stage::ConceptProposer, "not an object");
        assert!(err.to_string().contains("concept_proposer"));
    }
}
