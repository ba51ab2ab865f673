//! Canonical default values shared across the pipeline and service layer.

/// Maximum accepted upload size in bytes.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Maximum characters per chunk handed to LM-backed stages.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 3000;
/// Overlap between adjacent chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP_CHARS: usize = 200;
/// Semantic similarity threshold for embedding triage.
pub const DEFAULT_T_CONFLICT: f64 = 0.80;
/// Required margin between top-1 and top-2 triage candidates.
pub const TRIAGE_MARGIN: f64 = 0.05;
/// Per-stage LM chunk concurrency.
pub const DEFAULT_LM_CONCURRENCY: usize = 8;
/// Global concurrent-job cap.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 10;
/// Per LM call timeout in seconds.
pub const DEFAULT_LM_TIMEOUT_SECS: u64 = 60;
/// Per-stage soft timeout in seconds (10 minutes).
pub const DEFAULT_STAGE_SOFT_TIMEOUT_SECS: u64 = 600;
/// Per-stage hard timeout in seconds (20 minutes).
pub const DEFAULT_STAGE_HARD_TIMEOUT_SECS: u64 = 1200;
/// Per-job hard timeout in seconds (60 minutes).
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;
/// Job retention in days before the store sweep deletes a job directory.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
/// Confidence scale applied to expansions matched via an alternative label.
pub const DEFAULT_ALT_LABEL_EXPANSION_SCALE: f64 = 0.95;
/// Number of backup candidates the resolver keeps per annotation.
pub const RESOLVER_TOP_K: usize = 5;
/// Characters of document opening fed to the document-type classifier.
pub const DOC_TYPE_WINDOW_CHARS: usize = 2000;

/// Initial ruler confidence: multi-word preferred label.
pub const RULER_CONF_MULTI_PREFERRED: f64 = 0.90;
/// Initial ruler confidence: single-word preferred label.
pub const RULER_CONF_SINGLE_PREFERRED: f64 = 0.72;
/// Initial ruler confidence: multi-word alternative label.
pub const RULER_CONF_MULTI_ALT: f64 = 0.65;
/// Initial ruler confidence: single-word alternative label.
pub const RULER_CONF_SINGLE_ALT: f64 = 0.35;

/// Reranker blend weight on the prior score.
pub const RERANK_PRIOR_WEIGHT: f64 = 0.5;
/// Branch-judge blend weight on the existing score.
pub const BRANCH_JUDGE_PRIOR_WEIGHT: f64 = 0.7;
/// Resolver composite weight on the lexical score.
pub const RESOLVER_LEXICAL_WEIGHT: f64 = 0.6;

pub const CANCELLED_BY_USER_MESSAGE: &str = "Cancelled by user";
