//! Canonical data model for the FOLIO Enrich pipeline.
//!
//! Every type that crosses a stage boundary or is persisted to the job store
//! lives here: spans, concept annotations, OWL individuals, object-property
//! occurrences, triples, the job envelope, progress events, configuration,
//! and the error taxonomy. All types use serde with strict enum tagging so
//! that persisted artifacts are byte-stable across runs.

pub mod config;
pub mod defaults;
pub mod error;
pub mod event;
pub mod ids;
pub mod job;
pub mod metadata;
pub mod types;

// Re-export the types stages use on every line.
pub use config::{BoundaryPolicy, EnrichConfig};
pub use error::{EnrichError, EnrichResult};
pub use event::{JobEvent, JobEventKind};
pub use ids::{AnnotationId, AnnotationIdError, JobId};
pub use job::{
    JobState, JobStatusSnapshot, JobResult, QualitySignal, ResultCounts, Stage, StageTiming,
};
pub use metadata::{AreaOfLawScore, DocumentMetadata, KeyDate, PartyRecord};
pub use types::{
    sort_matches, AnnotationState, ConceptIri, ConceptMatch, Individual, IndividualType,
    LineageEvent, MatchSource, MatchType, PropertyAnnotation, RankedCandidate, Span, Triple,
    TriplePredicate,
};
