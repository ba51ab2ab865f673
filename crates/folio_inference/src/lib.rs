//! Language-model and embedding collaborator contracts.
//!
//! The core only ever sees these narrow interfaces; provider selection and
//! transport live outside. Per-task routing is a pass-through string keyed
//! by [`LmTask`].

pub mod embed;
pub mod lm;
pub mod prompt;
pub mod responses;

pub use embed::{cosine_similarity, EmbeddingService, NearestHit};
pub use lm::{call_structured, CallBudget, InferenceError, LanguageModel, LmTask, StructuredRequest};
pub use prompt::PromptTemplate;
pub use responses::{
    BranchJudgeResponse, DocTypeResponse, LinkerResponse, MetadataResponse, ProposedConcept,
    ProposerResponse, RerankResponse,
};
