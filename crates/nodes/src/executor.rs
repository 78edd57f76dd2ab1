//! The state machine that drives a single run.
//!
//! States are the configured ordinary stages, the supervisor, and termination.
//! The run starts at the first stage of the sequence. After an ordinary stage
//! the next state is the following stage, or the supervisor after the last one.
//! After the supervisor the verdict picks the next state:
//!
//! | Verdict | Next state |
//! |---------|------------|
//! | `end`, `escalate`, `ask_clarification` | terminated |
//! | `continue` | the verdict's `next_stage` |
//! | `loop` | the first stage, with `iteration_count + 1` |
//!
//! Hard limits on `iteration_count` and `errors` are checked after every
//! transition regardless of the supervisor. Supervisor faults and malformed
//! verdicts are executor faults; callers never see them as errors, they get
//! the safe-fallback record instead.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use pipeline::{
    FinalRecord, NextAction, PartialUpdate, PipelineConfig, RunContext, RunOutcome,
    SharedStateRecord, Stage, StageId, StageSequence, Termination, TriageError,
};
use tracing::{info, info_span, warn, Instrument};

use crate::cancel::CancelSignal;
use crate::runner::StageRunner;
use crate::supervisor::{Supervisor, SupervisorPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Ordinary(StageId),
    Supervisor,
}

enum Transition {
    Next(Position),
    Terminate(Termination),
}

/// Drives runs through a fixed stage sequence and a supervisor.
///
/// Holds no per-run state; one executor can serve many concurrent runs.
pub struct PipelineExecutor {
    sequence: StageSequence,
    stages: BTreeMap<StageId, Arc<dyn Stage>>,
    supervisor: Arc<dyn Stage>,
    runner: StageRunner,
    max_iterations: u32,
    max_errors: usize,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("sequence", &self.sequence)
            .field("runner", &self.runner)
            .field("max_iterations", &self.max_iterations)
            .field("max_errors", &self.max_errors)
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    /// Builds an executor whose sequence is the order of `stages`.
    ///
    /// # Errors
    ///
    /// - [`TriageError::ConfigurationError`] when `config` fails validation.
    /// - [`TriageError::InvalidSequence`] when `stages` is empty, repeats a
    ///   stage, contains the supervisor, or `supervisor` is not the supervisor.
    pub fn new(
        stages: Vec<Arc<dyn Stage>>,
        supervisor: Arc<dyn Stage>,
        config: &PipelineConfig,
    ) -> Result<Self, TriageError> {
        config.validate()?;
        if supervisor.id() != StageId::Supervisor {
            return Err(TriageError::InvalidSequence {
                message: format!("routing stage must be Supervisor, got {}", supervisor.id()),
            });
        }
        let sequence = StageSequence::new(stages.iter().map(|s| s.id()).collect())?;
        let stages = stages.into_iter().map(|s| (s.id(), s)).collect();

        Ok(Self {
            sequence,
            stages,
            supervisor,
            runner: StageRunner::new(config.stage_timeout()),
            max_iterations: config.max_iterations,
            max_errors: config.max_errors,
        })
    }

    /// Builds an executor routed by the standard [`Supervisor`] for `config`.
    pub fn with_default_supervisor(
        stages: Vec<Arc<dyn Stage>>,
        config: &PipelineConfig,
    ) -> Result<Self, TriageError> {
        let sequence = StageSequence::new(stages.iter().map(|s| s.id()).collect())?;
        let supervisor = Arc::new(Supervisor::new(sequence, SupervisorPolicy::from(config)));
        Self::new(stages, supervisor, config)
    }

    pub fn sequence(&self) -> &StageSequence {
        &self.sequence
    }

    /// Creates a record for `input` and `context` and runs it to completion.
    pub async fn start_run(&self, input: impl Into<String>, context: RunContext) -> FinalRecord {
        self.start_cancellable_run(input, context, &CancelSignal::never())
            .await
    }

    /// As [`start_run`](Self::start_run), observing `cancel` between stages.
    pub async fn start_cancellable_run(
        &self,
        input: impl Into<String>,
        context: RunContext,
        cancel: &CancelSignal,
    ) -> FinalRecord {
        let record = SharedStateRecord::new(input, context);
        FinalRecord::from_outcome(&self.drive(record, cancel).await)
    }

    /// Runs `record` to completion and projects the result.
    pub async fn run(&self, record: SharedStateRecord) -> FinalRecord {
        FinalRecord::from_outcome(&self.drive(record, &CancelSignal::never()).await)
    }

    /// Runs `record` to completion, returning the full outcome.
    pub async fn drive(&self, mut record: SharedStateRecord, cancel: &CancelSignal) -> RunOutcome {
        let started = Instant::now();
        let span = info_span!(
            "pipeline_run",
            run_id = %record.run_id(),
            session_id = record.derived().extension_text("session_id").as_deref(),
            user_id = record.derived().extension_text("user_id").as_deref()
        );

        async move {
            info!(stages = self.sequence.len(), "run started");
            let termination = self.transitions(&mut record, cancel).await;
            let elapsed = started.elapsed();
            info!(
                termination = ?termination,
                next_action = %record.next_action(),
                history = record.history().len(),
                errors = record.errors().len(),
                lap = record.iteration_count(),
                elapsed_ms = elapsed.as_millis() as u64,
                "run finished"
            );
            RunOutcome {
                record,
                termination,
                elapsed,
            }
        }
        .instrument(span)
        .await
    }

    async fn transitions(
        &self,
        record: &mut SharedStateRecord,
        cancel: &CancelSignal,
    ) -> Termination {
        let mut position = Position::Ordinary(self.sequence.first());
        loop {
            if cancel.is_cancelled() {
                warn!(position = ?position, "run cancelled between stages");
                return Termination::Cancelled;
            }

            let transition = match self.step(position, record).await {
                Ok(transition) => transition,
                Err(error) => {
                    warn!(error = %error, "executor fault; returning safe fallback");
                    return Termination::ExecutorFault {
                        message: error.to_string(),
                    };
                }
            };

            match transition {
                Transition::Terminate(termination) => return termination,
                Transition::Next(next) => {
                    if let Some(termination) = self.enforce_limits(record) {
                        return termination;
                    }
                    position = next;
                }
            }
        }
    }

    async fn step(
        &self,
        position: Position,
        record: &mut SharedStateRecord,
    ) -> Result<Transition, TriageError> {
        match position {
            Position::Ordinary(id) => {
                let stage = self
                    .stages
                    .get(&id)
                    .ok_or(TriageError::MissingStage { stage: id })?;
                let span = info_span!("stage", stage = %id, lap = record.iteration_count());
                let update = self.runner.run(stage, record).instrument(span).await;
                record.apply(update);

                Ok(Transition::Next(match self.sequence.after(id) {
                    Some(next) => Position::Ordinary(next),
                    None => Position::Supervisor,
                }))
            }
            Position::Supervisor => {
                let span = info_span!(
                    "stage",
                    stage = %StageId::Supervisor,
                    lap = record.iteration_count()
                );
                let mut update = self
                    .runner
                    .try_run(&self.supervisor, record)
                    .instrument(span)
                    .await
                    .map_err(|fault| TriageError::SupervisorFault {
                        message: fault.to_string(),
                    })?;
                let verdict = *update.next_action.get_or_insert(NextAction::End);
                let next_stage = update.next_stage;
                record.apply(update);

                info!(verdict = %verdict, next_stage = ?next_stage, lap = record.iteration_count(), "supervisor verdict");
                self.route(verdict, next_stage, record)
            }
        }
    }

    fn route(
        &self,
        verdict: NextAction,
        next_stage: Option<StageId>,
        record: &mut SharedStateRecord,
    ) -> Result<Transition, TriageError> {
        match verdict {
            NextAction::End | NextAction::Escalate | NextAction::AskClarification => {
                Ok(Transition::Terminate(Termination::Verdict { action: verdict }))
            }
            NextAction::Continue => {
                let target = next_stage.ok_or_else(|| TriageError::MalformedTransition {
                    message: "continue verdict without next_stage".to_string(),
                })?;
                if !self.sequence.contains(target) {
                    return Err(TriageError::MalformedTransition {
                        message: format!("continue verdict names {target}, which is not in the sequence"),
                    });
                }
                Ok(Transition::Next(Position::Ordinary(target)))
            }
            NextAction::Loop => {
                record.apply(PartialUpdate {
                    iteration_count: Some(record.iteration_count().saturating_add(1)),
                    ..PartialUpdate::default()
                });
                Ok(Transition::Next(Position::Ordinary(self.sequence.first())))
            }
        }
    }

    fn enforce_limits(&self, record: &mut SharedStateRecord) -> Option<Termination> {
        let (termination, warning) = if record.iteration_count() >= self.max_iterations {
            (
                Termination::IterationLimit,
                format!(
                    "iteration limit reached ({}/{})",
                    record.iteration_count(),
                    self.max_iterations
                ),
            )
        } else if record.errors().len() >= self.max_errors {
            (
                Termination::ErrorLimit,
                format!(
                    "error limit reached ({}/{})",
                    record.errors().len(),
                    self.max_errors
                ),
            )
        } else {
            return None;
        };

        warn!(limit = ?termination, "{warning}");
        record.apply(PartialUpdate::verdict(NextAction::End).with_warning(warning));
        Some(termination)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pipeline::StageFault;

    use super::*;

    struct Noop(StageId);

    #[async_trait]
    impl Stage for Noop {
        fn id(&self) -> StageId {
            self.0
        }

        async fn execute(&self, _record: &SharedStateRecord) -> Result<PartialUpdate, StageFault> {
            Ok(PartialUpdate::default())
        }
    }

    fn noop(id: StageId) -> Arc<dyn Stage> {
        Arc::new(Noop(id))
    }

    #[test]
    fn construction_rejects_bad_sequences() {
        let config = PipelineConfig::default();

        let empty = PipelineExecutor::with_default_supervisor(Vec::new(), &config);
        assert!(matches!(empty, Err(TriageError::InvalidSequence { .. })));

        let duplicate = PipelineExecutor::with_default_supervisor(
            vec![noop(StageId::RiskAssessor), noop(StageId::RiskAssessor)],
            &config,
        );
        assert!(matches!(duplicate, Err(TriageError::InvalidSequence { .. })));

        let wrong_router = PipelineExecutor::new(
            vec![noop(StageId::RiskAssessor)],
            noop(StageId::DiagnosticAnalyzer),
            &config,
        );
        assert!(matches!(wrong_router, Err(TriageError::InvalidSequence { .. })));
    }

    #[test]
    fn construction_rejects_invalid_config() {
        let config = PipelineConfig {
            max_iterations: 0,
            ..PipelineConfig::default()
        };
        let result = PipelineExecutor::with_default_supervisor(vec![noop(StageId::RiskAssessor)], &config);
        assert!(matches!(result, Err(TriageError::ConfigurationError { .. })));
    }

    #[tokio::test]
    async fn supervisor_without_verdict_ends_the_run() {
        let executor = PipelineExecutor::new(
            vec![noop(StageId::SymptomExtractor)],
            noop(StageId::Supervisor),
            &PipelineConfig::default(),
        )
        .unwrap();

        let outcome = executor
            .drive(SharedStateRecord::new("x", RunContext::new()), &CancelSignal::never())
            .await;

        assert_eq!(
            outcome.termination,
            Termination::Verdict {
                action: NextAction::End
            }
        );
        assert_eq!(outcome.record.next_action(), NextAction::End);
        assert_eq!(
            outcome.record.history(),
            [StageId::SymptomExtractor, StageId::Supervisor]
        );
    }
}
