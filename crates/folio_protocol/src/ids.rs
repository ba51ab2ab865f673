//! Stable identifiers used across the pipeline and the job store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Canonical job identifier.
///
/// Jobs are addressed by UUID from submission onward; the store uses the
/// string form as the job directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Identifier for a single annotation within a job.
///
/// Assigned at first persistence and monotonically increasing per job.
/// Cross-references (promote, cascade, triples) use these ids, never
/// positions in the output vectors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default,
)]
#[serde(transparent)]
pub struct AnnotationId(u64);

impl AnnotationId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AnnotationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<AnnotationId> for u64 {
    fn from(value: AnnotationId) -> Self {
        value.0
    }
}

impl FromStr for AnnotationId {
    type Err = AnnotationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u64>()
            .map_err(|_| AnnotationIdError::Parse(s.to_string()))?;
        Ok(AnnotationId::new(value))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnnotationIdError {
    #[error("invalid annotation id: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_roundtrip() {
        let id = JobId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
        let from_str: JobId = id.to_string().parse().unwrap();
        assert_eq!(from_str, id);
    }

    #[test]
    fn test_annotation_id_json_is_bare_number() {
        let id = AnnotationId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let parsed: AnnotationId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_annotation_id_parse_rejects_garbage() {
        assert!("not-a-number".parse::<AnnotationId>().is_err());
        assert_eq!("7".parse::<AnnotationId>().unwrap(), AnnotationId::new(7));
    }

    #[test]
    fn test_annotation_id_next_is_monotonic() {
        let id = AnnotationId::new(3);
        assert_eq!(id.next(), AnnotationId::new(4));
    }
}
