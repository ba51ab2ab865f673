//! Job envelope: pipeline stages, quality signals, timings, and the
//! `JobResult` that the store persists and the API serves.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::EnrichConfig;
use crate::ids::JobId;
use crate::metadata::DocumentMetadata;
use crate::types::{ConceptMatch, Individual, PropertyAnnotation, Span, Triple};

// ============================================================================
// Stages
// ============================================================================

/// Every stage the orchestrator can run, in no particular order. Stage names
/// appear in lineage events, quality signals, timings, and progress events,
/// so the snake_case serialization here is the canonical spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Normalize,
    Ruler,
    ConceptProposer,
    IndividualExtractor,
    PropertyMatcher,
    DocTypeClassifier,
    Reconciler,
    Resolver,
    Reranker,
    BranchJudge,
    StringMatchExpander,
    IndividualLinker,
    PropertyLinker,
    DependencyExtractor,
    MetadataSynthesizer,
    AreaOfLaw,
    DocTypeCheck,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Normalize => "normalize",
            Stage::Ruler => "ruler",
            Stage::ConceptProposer => "concept_proposer",
            Stage::IndividualExtractor => "individual_extractor",
            Stage::PropertyMatcher => "property_matcher",
            Stage::DocTypeClassifier => "doc_type_classifier",
            Stage::Reconciler => "reconciler",
            Stage::Resolver => "resolver",
            Stage::Reranker => "reranker",
            Stage::BranchJudge => "branch_judge",
            Stage::StringMatchExpander => "string_match_expander",
            Stage::IndividualLinker => "individual_linker",
            Stage::PropertyLinker => "property_linker",
            Stage::DependencyExtractor => "dependency_extractor",
            Stage::MetadataSynthesizer => "metadata_synthesizer",
            Stage::AreaOfLaw => "area_of_law",
            Stage::DocTypeCheck => "doc_type_check",
        }
    }

    /// Stages that cannot run without a language model.
    pub fn requires_lm(&self) -> bool {
        matches!(
            self,
            Stage::ConceptProposer
                | Stage::DocTypeClassifier
                | Stage::Reranker
                | Stage::BranchJudge
                | Stage::IndividualLinker
                | Stage::PropertyLinker
                | Stage::MetadataSynthesizer
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job state
// ============================================================================

/// Terminal and in-flight job states surfaced by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Queued,
    Running,
    Completed,
    CompletedWithWarnings,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed
                | JobState::CompletedWithWarnings
                | JobState::Cancelled
                | JobState::Failed
        )
    }
}

// ============================================================================
// Quality signals and timings
// ============================================================================

/// Degradation breadcrumb: one entry per skipped stage, failed call, or
/// rejected item. Downstream consumers distinguish `completed` from
/// `completed_with_warnings` only through these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualitySignal {
    pub stage: Stage,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<usize>,
}

impl QualitySignal {
    pub fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
            detail: None,
            span: None,
            chunk: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = Some(chunk);
        self
    }
}

/// Wall-clock duration of one stage run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTiming {
    pub stage: Stage,
    pub millis: u64,
    /// False when the stage was skipped by degradation rules.
    pub ran: bool,
}

// ============================================================================
// Status and result
// ============================================================================

/// Output counts used by status reporting and stage-finished events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResultCounts {
    pub annotations: usize,
    pub individuals: usize,
    pub properties: usize,
    pub triples: usize,
}

/// Point-in-time view of a job for `status()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusSnapshot {
    pub job_id: JobId,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    pub counts: ResultCounts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timings: Vec<StageTiming>,
}

/// The envelope a job produces. Exclusively owns every annotation,
/// individual, property, and triple; the document itself is not stored here,
/// only its canonical hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub job_id: JobId,
    /// blake3 hex digest of the normalized text.
    pub text_hash: String,
    pub state: JobState,
    /// Set when cancellation or a hard timeout left stage output partial.
    #[serde(default)]
    pub incomplete: bool,
    pub annotations: Vec<ConceptMatch>,
    pub individuals: Vec<Individual>,
    pub properties: Vec<PropertyAnnotation>,
    pub triples: Vec<Triple>,
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quality_signals: Vec<QualitySignal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timings: Vec<StageTiming>,
    /// Effective configuration the job ran with.
    pub config: EnrichConfig,
}

impl JobResult {
    pub fn new(job_id: JobId, text_hash: impl Into<String>, config: EnrichConfig) -> Self {
        Self {
            job_id,
            text_hash: text_hash.into(),
            state: JobState::Running,
            incomplete: false,
            annotations: Vec::new(),
            individuals: Vec::new(),
            properties: Vec::new(),
            triples: Vec::new(),
            metadata: DocumentMetadata::default(),
            quality_signals: Vec::new(),
            timings: Vec::new(),
            config,
        }
    }

    pub fn counts(&self) -> ResultCounts {
        ResultCounts {
            annotations: self.annotations.len(),
            individuals: self.individuals.len(),
            properties: self.properties.len(),
            triples: self.triples.len(),
        }
    }

    /// Terminal state implied by the accumulated signals: warnings demote
    /// `Completed` to `CompletedWithWarnings`; cancelled/failed are set
    /// explicitly by the orchestrator and never overwritten here.
    pub fn finalize_state(&mut self) {
        if self.state == JobState::Running || self.state == JobState::Queued {
            self.state = if self.quality_signals.is_empty() {
                JobState::Completed
            } else {
                JobState::CompletedWithWarnings
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_serialization_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&Stage::StringMatchExpander).unwrap(),
            "\"string_match_expander\""
        );
        assert_eq!(Stage::BranchJudge.to_string(), "branch_judge");
    }

    #[test]
    fn test_lm_stage_partition() {
        assert!(Stage::ConceptProposer.requires_lm());
        assert!(Stage::MetadataSynthesizer.requires_lm());
        assert!(!Stage::Ruler.requires_lm());
        assert!(!Stage::StringMatchExpander.requires_lm());
        assert!(!Stage::DependencyExtractor.requires_lm());
    }

    #[test]
    fn test_finalize_state_respects_signals() {
        let mut result = JobResult::new(JobId::new(), "abc", EnrichConfig::default());
        result.finalize_state();
        assert_eq!(result.state, JobState::Completed);

        let mut warned = JobResult::new(JobId::new(), "abc", EnrichConfig::default());
        warned
            .quality_signals
            .push(QualitySignal::new(Stage::Reranker, "lm_unavailable"));
        warned.finalize_state();
        assert_eq!(warned.state, JobState::CompletedWithWarnings);
    }

    #[test]
    fn test_finalize_state_keeps_cancelled() {
        let mut result = JobResult::new(JobId::new(), "abc", EnrichConfig::default());
        result.state = JobState::Cancelled;
        result.finalize_state();
        assert_eq!(result.state, JobState::Cancelled);
    }

    #[test]
    fn test_job_result_roundtrip() {
        let result = JobResult::new(JobId::new(), "deadbeef", EnrichConfig::default());
        let json = serde_json::to_string_pretty(&result).unwrap();
        let parsed: JobResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
