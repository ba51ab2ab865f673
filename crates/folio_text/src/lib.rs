//! Text normalization collaborator: normalized document text, chunked view,
//! sentence index, and the case-folding maps the matchers scan over.
//!
//! The document is immutable after normalization. All spans everywhere in
//! the pipeline are half-open character offsets into `Document::text`.

pub mod chunk;
pub mod document;
pub mod fold;
pub mod sentence;

pub use chunk::{chunk_text, Chunk};
pub use document::{Document, NormalizeError};
pub use fold::{fold_key, FoldedText};
pub use sentence::SentenceIndex;
