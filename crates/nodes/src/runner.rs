//! Uniform bookkeeping around every stage invocation.
//!
//! The runner is not a stage and is not addressable by routing. Each
//! invocation runs as its own tokio task so a panic inside a stage surfaces as
//! a [`StageFault::Panicked`] instead of unwinding through the executor, and the
//! task is aborted once the per-stage timeout elapses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pipeline::{NextAction, PartialUpdate, SharedStateRecord, Stage, StageFault, StageId};
use tokio::task::JoinError;
use tracing::{debug, warn, Instrument};

/// Wraps stage calls with history tracking, timeouts, and fault capture.
#[derive(Debug, Clone)]
pub struct StageRunner {
    timeout: Duration,
}

impl StageRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `stage` against `record`, always returning a well-formed update.
    ///
    /// On success the stage's delta is returned with its id appended to
    /// `history`. On fault the delta is discarded and replaced by a single
    /// error entry naming the stage plus an `escalate` verdict.
    pub async fn run(&self, stage: &Arc<dyn Stage>, record: &SharedStateRecord) -> PartialUpdate {
        let id = stage.id();
        match self.try_run(stage, record).await {
            Ok(update) => update,
            Err(fault) => {
                warn!(stage = %id, error = %fault, "stage faulted; recording error and escalating");
                Self::fault_update(id, &fault)
            }
        }
    }

    /// Runs `stage` against `record`, returning the fault instead of normalising it.
    ///
    /// Used for the supervisor, whose faults the executor cannot recover from.
    pub async fn try_run(
        &self,
        stage: &Arc<dyn Stage>,
        record: &SharedStateRecord,
    ) -> Result<PartialUpdate, StageFault> {
        let id = stage.id();
        let started = Instant::now();

        let task_stage = Arc::clone(stage);
        let snapshot = record.clone();
        let mut handle = tokio::spawn(
            async move { task_stage.execute(&snapshot).await }.instrument(tracing::Span::current()),
        );

        let result = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(fault_from_join(join_error)),
            Err(_) => {
                handle.abort();
                Err(StageFault::TimedOut {
                    after: self.timeout,
                })
            }
        };

        let mut update = result?;
        update.history = vec![id];

        debug!(
            stage = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            errors = update.errors.len(),
            "stage completed"
        );
        Ok(update)
    }

    /// The update recorded for a faulted invocation of `stage`.
    pub fn fault_update(stage: StageId, fault: &StageFault) -> PartialUpdate {
        PartialUpdate::verdict(NextAction::Escalate).with_error(stage, fault.to_string())
    }
}

fn fault_from_join(error: JoinError) -> StageFault {
    if !error.is_panic() {
        return StageFault::Aborted;
    }
    let payload = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    StageFault::Panicked { message }
}
