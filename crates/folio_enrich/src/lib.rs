//! Programmatic service facade over the enrichment pipeline: job
//! submission, status, results, event streaming, and the user-action API
//! the HTTP routes wrap.

pub mod actions;
pub mod service;

pub use service::{EnrichService, ServiceError};
