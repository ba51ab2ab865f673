//! Cooperative job cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use folio_protocol::{EnrichError, EnrichResult};

/// Shared cancel flag for one enrichment job.
///
/// Stages poll at their natural boundaries: per chunk, per annotation, per
/// outbound call. Item loops that must keep their partial output call
/// [`CancellationToken::is_cancelled`] and break; the Phase 3 stage chain
/// calls [`CancellationToken::checkpoint`] between stages and lets
/// [`EnrichError::Cancelled`] unwind to the orchestrator, which keeps the
/// working set and marks the job cancelled.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Idempotent; in-flight LM and embedding calls
    /// are abandoned at their next poll, no rollback happens.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Non-consuming poll for item loops that break and hand back partial
    /// output.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Stage-boundary poll for the sequential Phase 3 chain: raises
    /// [`EnrichError::Cancelled`] so the `?` operator unwinds the stage and
    /// the orchestrator finalizes the partial job.
    pub fn checkpoint(&self) -> EnrichResult<()> {
        if self.is_cancelled() {
            Err(EnrichError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_raises_cancelled() {
        let token = CancellationToken::new();
        assert!(token.checkpoint().is_ok());
        token.cancel();
        assert!(matches!(token.checkpoint(), Err(EnrichError::Cancelled)));
    }

    #[test]
    fn test_clones_share_the_flag() {
        let token = CancellationToken::new();
        let stage_copy = token.clone();
        token.cancel();
        assert!(stage_copy.is_cancelled());
        // Cancelling again stays cancelled.
        stage_copy.cancel();
        assert!(token.checkpoint().is_err());
    }

    #[test]
    fn test_checkpoint_unwinds_a_stage_chain() {
        fn stage_chain(cancel: &CancellationToken, cancel_midway: bool) -> EnrichResult<u32> {
            cancel.checkpoint()?;
            if cancel_midway {
                cancel.cancel();
            }
            cancel.checkpoint()?;
            Ok(2)
        }

        let token = CancellationToken::new();
        assert_eq!(stage_chain(&token, false).unwrap(), 2);
        let token = CancellationToken::new();
        assert!(matches!(
            stage_chain(&token, true),
            Err(EnrichError::Cancelled)
        ));
    }
}
