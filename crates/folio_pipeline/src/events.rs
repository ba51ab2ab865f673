//! Progress event emission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use folio_protocol::{JobEvent, JobEventKind, JobId, Stage};

/// Per-job event fan-out. Sequence numbers are allocated atomically so event
/// order is total even when Phase 2 stages finish concurrently. Send
/// failures (no subscribers) are ignored.
#[derive(Clone)]
pub struct EventSink {
    job_id: JobId,
    seq: Arc<AtomicU64>,
    sender: broadcast::Sender<JobEvent>,
}

impl EventSink {
    pub fn new(job_id: JobId, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(16));
        Self {
            job_id,
            seq: Arc::new(AtomicU64::new(0)),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, stage: Stage, kind: JobEventKind) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(JobEvent::new(self.job_id, seq, stage, kind));
    }
}
