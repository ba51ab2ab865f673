//! The language-model interface and its retry policy.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum InferenceError {
    /// Call exceeded its budget or the provider timed out.
    #[error("inference call timed out")]
    Timeout,
    /// Provider is down or returned a retryable failure.
    #[error("inference provider unavailable: {0}")]
    Unavailable(String),
    /// Response did not match the expected schema.
    #[error("malformed structured response: {0}")]
    Malformed(String),
    /// Non-retryable provider failure.
    #[error("inference provider error: {0}")]
    Provider(String),
}

impl InferenceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, InferenceError::Timeout | InferenceError::Unavailable(_))
    }
}

/// Pipeline tasks that reach the language model. Used only to look up the
/// routing key the caller configured; the core never interprets providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LmTask {
    ConceptProposer,
    DocTypeClassifier,
    Rerank,
    BranchJudge,
    IndividualLinker,
    PropertyLinker,
    Metadata,
}

impl LmTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            LmTask::ConceptProposer => "concept_proposer",
            LmTask::DocTypeClassifier => "doc_type_classifier",
            LmTask::Rerank => "rerank",
            LmTask::BranchJudge => "branch_judge",
            LmTask::IndividualLinker => "individual_linker",
            LmTask::PropertyLinker => "property_linker",
            LmTask::Metadata => "metadata",
        }
    }
}

impl fmt::Display for LmTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token and wall-clock budget for one call.
#[derive(Debug, Clone, Copy)]
pub struct CallBudget {
    pub max_tokens: usize,
    pub timeout: Duration,
}

impl Default for CallBudget {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            timeout: Duration::from_secs(60),
        }
    }
}

/// One structured request: prompt plus the versioned schema name the
/// response must satisfy.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub task: LmTask,
    /// Pass-through routing key from configuration, if any.
    pub routing_key: Option<String>,
    pub prompt: String,
    pub schema_name: &'static str,
    pub schema_version: u32,
    pub budget: CallBudget,
}

/// The language-model collaborator contract.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// JSON-validated single response.
    async fn structured(
        &self,
        request: &StructuredRequest,
    ) -> Result<serde_json::Value, InferenceError>;

    /// Free-form response. Not used by the enrichment core itself.
    async fn complete(&self, prompt: &str, budget: CallBudget) -> Result<String, InferenceError>;
}

/// Issue a structured call and parse the response into `T`.
///
/// Retry policy per the failure-semantics contract: one retry with a short
/// backoff on transient failures, one retry on a malformed response. The
/// second failure of either kind is returned to the caller, which degrades
/// the affected item and records a quality signal.
pub async fn call_structured<T: DeserializeOwned>(
    lm: &dyn LanguageModel,
    request: &StructuredRequest,
) -> Result<T, InferenceError> {
    let mut schema_retried = false;
    let mut transient_retried = false;
    loop {
        let outcome = tokio::time::timeout(request.budget.timeout, lm.structured(request)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout),
        };
        match result {
            Ok(value) => match serde_json::from_value::<T>(value) {
                Ok(parsed) => return Ok(parsed),
                Err(err) if !schema_retried => {
                    warn!(task = %request.task, error = %err, "structured response failed validation, retrying once");
                    schema_retried = true;
                }
                Err(err) => {
                    return Err(InferenceError::Malformed(err.to_string()));
                }
            },
            Err(err) if err.is_transient() && !transient_retried => {
                warn!(task = %request.task, error = %err, "transient inference failure, retrying once");
                transient_retried = true;
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
