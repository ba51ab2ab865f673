//! Progress events emitted during job execution.
//!
//! Annotation events carry the full record so stream consumers never need a
//! second fetch.

use serde::{Deserialize, Serialize};

use crate::ids::{AnnotationId, JobId};
use crate::job::{JobState, ResultCounts, Stage};
use crate::types::{ConceptMatch, Individual, PropertyAnnotation};

/// Event kinds, tagged for the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEventKind {
    StageStarted,
    StageFinished { counts: ResultCounts },
    StageSkipped { reason: String },
    AnnotationAdded { annotation: ConceptMatch },
    AnnotationUpdated { annotation: ConceptMatch },
    AnnotationRemoved { annotation_id: AnnotationId },
    IndividualAdded { individual: Individual },
    PropertyAdded { property: PropertyAnnotation },
    JobFinished { state: JobState },
}

/// One event on a job's progress stream. `seq` is monotonically increasing
/// per job so consumers can re-order after reconnects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobEvent {
    pub job_id: JobId,
    pub seq: u64,
    /// RFC3339
    pub timestamp: String,
    pub stage: Stage,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

impl JobEvent {
    pub fn new(job_id: JobId, seq: u64, stage: Stage, kind: JobEventKind) -> Self {
        Self {
            job_id,
            seq,
            timestamp: chrono::Utc::now().to_rfc3339(),
            stage,
            kind,
        }
    }
}
