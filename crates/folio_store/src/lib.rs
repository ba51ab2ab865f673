//! Filesystem job store.
//!
//! One directory per job under the store root:
//! ```text
//! <root>/<job_id>/result.json     # JobResult, temp file + atomic rename
//! <root>/<job_id>/lineage.jsonl   # append-only line-delimited events
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use folio_protocol::{AnnotationId, JobId, JobResult, LineageEvent};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One line of `lineage.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineageRecord {
    pub annotation_id: AnnotationId,
    #[serde(flatten)]
    pub event: LineageEvent,
}

/// Filesystem-backed job persistence. Cheap to clone; paths only.
#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    fn result_path(&self, job_id: JobId) -> PathBuf {
        self.job_dir(job_id).join("result.json")
    }

    fn lineage_path(&self, job_id: JobId) -> PathBuf {
        self.job_dir(job_id).join("lineage.jsonl")
    }

    /// Persist the result via temporary file + atomic rename, so readers
    /// never observe a half-written artifact.
    pub async fn save_result(&self, result: &JobResult) -> Result<(), StoreError> {
        let dir = self.job_dir(result.job_id);
        tokio::fs::create_dir_all(&dir).await?;
        let target = self.result_path(result.job_id);
        let tmp = dir.join("result.json.tmp");
        let json = serde_json::to_vec_pretty(result)?;
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &target).await?;
        debug!(job_id = %result.job_id, bytes = json.len(), "job result persisted");
        Ok(())
    }

    pub async fn load_result(&self, job_id: JobId) -> Result<JobResult, StoreError> {
        let path = self.result_path(job_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(job_id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Append one lineage event. Line-delimited JSON, one event per line.
    pub async fn append_lineage(
        &self,
        job_id: JobId,
        annotation_id: AnnotationId,
        event: &LineageEvent,
    ) -> Result<(), StoreError> {
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        let record = LineageRecord {
            annotation_id,
            event: event.clone(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.lineage_path(job_id))
            .await?;
        file.write_all(&line).await?;
        Ok(())
    }

    pub async fn read_lineage(&self, job_id: JobId) -> Result<Vec<LineageRecord>, StoreError> {
        let path = self.lineage_path(job_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobId>, StoreError> {
        let mut jobs = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(jobs),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(job_id) = name.parse::<JobId>() {
                    jobs.push(job_id);
                }
            }
        }
        jobs.sort();
        Ok(jobs)
    }

    /// Delete job directories whose result is older than the retention
    /// window. Returns the number of jobs removed.
    pub async fn sweep(&self, retention_days: u32) -> Result<usize, StoreError> {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(retention_days as u64 * 24 * 3600))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0usize;
        for job_id in self.list_jobs().await? {
            let path = self.result_path(job_id);
            let modified = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                // Job directory without a result yet: leave it alone.
                Err(_) => continue,
            };
            if modified < cutoff {
                match tokio::fs::remove_dir_all(self.job_dir(job_id)).await {
                    Ok(()) => {
                        removed += 1;
                        debug!(%job_id, "expired job swept");
                    }
                    Err(e) => warn!(%job_id, error = %e, "failed to sweep job"),
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_protocol::EnrichConfig;

    fn sample_result() -> JobResult {
        JobResult::new(JobId::new(), "deadbeef", EnrichConfig::default())
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let result = sample_result();
        store.save_result(&result).await.unwrap();
        let loaded = store.load_result(result.job_id).await.unwrap();
        assert_eq!(loaded, result);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let result = sample_result();
        store.save_result(&result).await.unwrap();
        let tmp = dir
            .path()
            .join(result.job_id.to_string())
            .join("result.json.tmp");
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn test_load_missing_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let err = store.load_result(JobId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_lineage_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let job_id = JobId::new();
        let first = LineageEvent::new("reranker", "score_update");
        let second = LineageEvent::new("reject", "user_reject");
        store
            .append_lineage(job_id, AnnotationId::new(1), &first)
            .await
            .unwrap();
        store
            .append_lineage(job_id, AnnotationId::new(2), &second)
            .await
            .unwrap();
        let records = store.read_lineage(job_id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].annotation_id, AnnotationId::new(1));
        assert_eq!(records[0].event.actor, "reranker");
        assert_eq!(records[1].event.reason, "user_reject");
    }

    #[tokio::test]
    async fn test_list_jobs_ignores_foreign_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let result = sample_result();
        store.save_result(&result).await.unwrap();
        std::fs::create_dir(dir.path().join("not-a-job")).unwrap();
        let jobs = store.list_jobs().await.unwrap();
        assert_eq!(jobs, vec![result.job_id]);
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let result = sample_result();
        store.save_result(&result).await.unwrap();
        let removed = store.sweep(30).await.unwrap();
        assert_eq!(removed, 0);
        assert!(store.load_result(result.job_id).await.is_ok());
    }
}
