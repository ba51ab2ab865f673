//! Job lifecycle management: submission under the global concurrency cap,
//! status snapshots, blocking result retrieval, and event streaming.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex, Semaphore};
use tracing::{error, info};

use folio_pipeline::{
    CancellationToken, DocumentSource, EventSink, Orchestrator, PipelineDeps,
};
use folio_protocol::{
    EnrichConfig, JobEvent, JobId, JobResult, JobState, JobStatusSnapshot, ResultCounts, Stage,
};
use folio_store::{JobStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown job: {0}")]
    UnknownJob(JobId),
    #[error("job {0} is still running")]
    JobRunning(JobId),
    #[error("unknown annotation: {0}")]
    UnknownAnnotation(folio_protocol::AnnotationId),
    #[error("{0} is not a backup candidate of the annotation")]
    UnknownBackup(folio_protocol::ConceptIri),
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct JobHandle {
    events: EventSink,
    cancel: CancellationToken,
    /// Latest state + stage, updated by the watcher task.
    progress: Arc<Mutex<(JobState, Option<Stage>, ResultCounts)>>,
    done: watch::Receiver<bool>,
}

/// The programmatic API the HTTP layer wraps. Cheap to clone.
#[derive(Clone)]
pub struct EnrichService {
    deps: Arc<PipelineDeps>,
    store: JobStore,
    defaults: EnrichConfig,
    jobs: Arc<Mutex<HashMap<JobId, Arc<JobHandle>>>>,
    job_slots: Arc<Semaphore>,
}

impl EnrichService {
    pub fn new(deps: Arc<PipelineDeps>, store: JobStore, defaults: EnrichConfig) -> Self {
        let job_slots = Arc::new(Semaphore::new(defaults.max_concurrent_jobs.max(1)));
        Self {
            deps,
            store,
            defaults,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            job_slots,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Queue one document. Returns immediately; the job runs under the
    /// global concurrency cap.
    pub async fn submit(
        &self,
        source: DocumentSource,
        config: Option<EnrichConfig>,
    ) -> JobId {
        let job_id = JobId::new();
        let config = config.unwrap_or_else(|| self.defaults.clone());
        let events = EventSink::new(job_id, 1024);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        let progress = Arc::new(Mutex::new((JobState::Queued, None, ResultCounts::default())));
        let handle = Arc::new(JobHandle {
            events: events.clone(),
            cancel: cancel.clone(),
            progress: Arc::clone(&progress),
            done: done_rx,
        });
        self.jobs.lock().await.insert(job_id, Arc::clone(&handle));

        // Watcher: mirror the event stream into the status snapshot.
        {
            let mut rx = events.subscribe();
            let progress = Arc::clone(&progress);
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let mut guard = progress.lock().await;
                            guard.1 = Some(event.stage);
                            if guard.0 == JobState::Queued {
                                guard.0 = JobState::Running;
                            }
                            if let folio_protocol::JobEventKind::JobFinished { state } = event.kind
                            {
                                guard.0 = state;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }

        let service = self.clone();
        let job_timeout = std::time::Duration::from_secs(config.job_timeout_secs);
        tokio::spawn(async move {
            let _permit = service.job_slots.acquire().await;
            let orchestrator = Orchestrator::new(Arc::clone(&service.deps));
            let run = orchestrator.run(job_id, source, config, cancel.clone(), events);
            let mut result = match tokio::time::timeout(job_timeout, run).await {
                Ok(result) => result,
                Err(_) => {
                    // Hard job timeout: cancel cooperatively and surface what
                    // we have (the dropped future already released the set).
                    error!(%job_id, "job exceeded hard timeout");
                    cancel.cancel();
                    let mut result =
                        JobResult::new(job_id, "", service.defaults.clone());
                    result.state = JobState::Failed;
                    result.incomplete = true;
                    result
                }
            };
            result.finalize_state();
            {
                let mut guard = progress.lock().await;
                guard.0 = result.state;
                guard.2 = result.counts();
            }
            if let Err(e) = service.store.save_result(&result).await {
                error!(%job_id, error = %e, "failed to persist job result");
            }
            let _ = done_tx.send(true);
            info!(%job_id, state = ?result.state, "job finished");
        });
        job_id
    }

    pub async fn cancel(&self, job_id: JobId) -> Result<(), ServiceError> {
        let jobs = self.jobs.lock().await;
        let handle = jobs.get(&job_id).ok_or(ServiceError::UnknownJob(job_id))?;
        handle.cancel.cancel();
        Ok(())
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobStatusSnapshot, ServiceError> {
        let jobs = self.jobs.lock().await;
        match jobs.get(&job_id) {
            Some(handle) => {
                let guard = handle.progress.lock().await;
                Ok(JobStatusSnapshot {
                    job_id,
                    state: guard.0,
                    current_stage: guard.1,
                    counts: guard.2,
                    timings: Vec::new(),
                })
            }
            None => {
                // Restarted process or swept registry: fall back to the store.
                let result = self.store.load_result(job_id).await.map_err(|e| match e {
                    StoreError::NotFound(_) => ServiceError::UnknownJob(job_id),
                    other => ServiceError::Store(other),
                })?;
                Ok(JobStatusSnapshot {
                    job_id,
                    state: result.state,
                    current_stage: None,
                    counts: result.counts(),
                    timings: result.timings,
                })
            }
        }
    }

    /// Block until the job completes, then return the persisted result.
    pub async fn result(&self, job_id: JobId) -> Result<JobResult, ServiceError> {
        let handle = {
            let jobs = self.jobs.lock().await;
            jobs.get(&job_id).cloned()
        };
        if let Some(handle) = handle {
            let mut done = handle.done.clone();
            while !*done.borrow() {
                if done.changed().await.is_err() {
                    break;
                }
            }
        }
        self.store.load_result(job_id).await.map_err(|e| match e {
            StoreError::NotFound(_) => ServiceError::UnknownJob(job_id),
            other => ServiceError::Store(other),
        })
    }

    /// Non-blocking variant: whatever has been persisted so far, if
    /// anything.
    pub async fn result_partial(&self, job_id: JobId) -> Result<Option<JobResult>, ServiceError> {
        match self.store.load_result(job_id).await {
            Ok(result) => Ok(Some(result)),
            Err(StoreError::NotFound(_)) => {
                let jobs = self.jobs.lock().await;
                if jobs.contains_key(&job_id) {
                    Ok(None)
                } else {
                    Err(ServiceError::UnknownJob(job_id))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn stream_events(
        &self,
        job_id: JobId,
    ) -> Result<broadcast::Receiver<JobEvent>, ServiceError> {
        let jobs = self.jobs.lock().await;
        let handle = jobs.get(&job_id).ok_or(ServiceError::UnknownJob(job_id))?;
        Ok(handle.events.subscribe())
    }

    /// Load a completed result for a user action; running jobs refuse.
    pub(crate) async fn load_completed(&self, job_id: JobId) -> Result<JobResult, ServiceError> {
        match self.store.load_result(job_id).await {
            Ok(result) => Ok(result),
            Err(StoreError::NotFound(_)) => {
                let jobs = self.jobs.lock().await;
                if jobs.contains_key(&job_id) {
                    Err(ServiceError::JobRunning(job_id))
                } else {
                    Err(ServiceError::UnknownJob(job_id))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn sweep(&self) -> Result<usize, ServiceError> {
        Ok(self.store.sweep(self.defaults.retention_days).await?)
    }

    pub(crate) fn deps(&self) -> &Arc<PipelineDeps> {
        &self.deps
    }
}
