//! Effective job configuration, persisted inside every `JobResult`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::defaults;

/// Word-boundary policy for matcher boundary validation.
///
/// Controls which punctuation counts as a word character when the ruler and
/// expander check that a raw automaton hit sits on word boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Alphanumerics plus hyphen are word characters ("cross-claim" is one
    /// word). Default, matching the reference calibration.
    #[default]
    HyphenIsWord,
    /// Only alphanumerics are word characters.
    Alphanumeric,
}

/// Recognized options that affect the core pipeline.
///
/// Every field has a serde default so configs written by older builds keep
/// deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "default_chunk_overlap_chars")]
    pub chunk_overlap_chars: usize,
    /// Semantic similarity threshold for embedding triage (`T_conflict`).
    #[serde(default = "default_t_conflict")]
    pub t_conflict: f64,
    #[serde(default = "default_lm_concurrency")]
    pub lm_concurrency: usize,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_lm_timeout_secs")]
    pub lm_timeout_secs: u64,
    #[serde(default = "default_stage_soft_timeout_secs")]
    pub stage_soft_timeout_secs: u64,
    #[serde(default = "default_stage_hard_timeout_secs")]
    pub stage_hard_timeout_secs: u64,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_alt_label_expansion_scale")]
    pub alt_label_expansion_scale: f64,
    #[serde(default)]
    pub boundary_policy: BoundaryPolicy,
    /// Per-task LM routing keys, passed through to the provider layer
    /// untouched (the core never interprets them).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lm_task_routing: BTreeMap<String, String>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: defaults::DEFAULT_MAX_UPLOAD_BYTES,
            max_chunk_chars: defaults::DEFAULT_MAX_CHUNK_CHARS,
            chunk_overlap_chars: defaults::DEFAULT_CHUNK_OVERLAP_CHARS,
            t_conflict: defaults::DEFAULT_T_CONFLICT,
            lm_concurrency: defaults::DEFAULT_LM_CONCURRENCY,
            max_concurrent_jobs: defaults::DEFAULT_MAX_CONCURRENT_JOBS,
            lm_timeout_secs: defaults::DEFAULT_LM_TIMEOUT_SECS,
            stage_soft_timeout_secs: defaults::DEFAULT_STAGE_SOFT_TIMEOUT_SECS,
            stage_hard_timeout_secs: defaults::DEFAULT_STAGE_HARD_TIMEOUT_SECS,
            job_timeout_secs: defaults::DEFAULT_JOB_TIMEOUT_SECS,
            retention_days: defaults::DEFAULT_RETENTION_DAYS,
            alt_label_expansion_scale: defaults::DEFAULT_ALT_LABEL_EXPANSION_SCALE,
            boundary_policy: BoundaryPolicy::default(),
            lm_task_routing: BTreeMap::new(),
        }
    }
}

fn default_max_upload_bytes() -> usize {
    defaults::DEFAULT_MAX_UPLOAD_BYTES
}
fn default_max_chunk_chars() -> usize {
    defaults::DEFAULT_MAX_CHUNK_CHARS
}
fn default_chunk_overlap_chars() -> usize {
    defaults::DEFAULT_CHUNK_OVERLAP_CHARS
}
fn default_t_conflict() -> f64 {
    defaults::DEFAULT_T_CONFLICT
}
fn default_lm_concurrency() -> usize {
    defaults::DEFAULT_LM_CONCURRENCY
}
fn default_max_concurrent_jobs() -> usize {
    defaults::DEFAULT_MAX_CONCURRENT_JOBS
}
fn default_lm_timeout_secs() -> u64 {
    defaults::DEFAULT_LM_TIMEOUT_SECS
}
fn default_stage_soft_timeout_secs() -> u64 {
    defaults::DEFAULT_STAGE_SOFT_TIMEOUT_SECS
}
fn default_stage_hard_timeout_secs() -> u64 {
    defaults::DEFAULT_STAGE_HARD_TIMEOUT_SECS
}
fn default_job_timeout_secs() -> u64 {
    defaults::DEFAULT_JOB_TIMEOUT_SECS
}
fn default_retention_days() -> u32 {
    defaults::DEFAULT_RETENTION_DAYS
}
fn default_alt_label_expansion_scale() -> f64 {
    defaults::DEFAULT_ALT_LABEL_EXPANSION_SCALE
}
