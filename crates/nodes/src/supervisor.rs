//! The routing stage.
//!
//! The supervisor never calls a content generator: it inspects the record and
//! the policy constants and emits a verdict. Decision order, first match wins:
//!
//! 1. `iteration_count >= max_iterations` → `end`, warning "max iterations reached"
//! 2. `errors.len() >= max_errors` → `end`, warning "too many errors"
//! 3. urgency is emergency → `escalate`, warning "EMERGENCY: seek immediate attention"
//! 4. normal advancement relative to the last ordinary stage in `history`
//!
//! Guard 2 precedes guard 3: a run that has exhausted its error budget ends
//! even when the last successful stage classified the case as an emergency.

use async_trait::async_trait;
use pipeline::{
    NextAction, PartialUpdate, PipelineConfig, SharedStateRecord, Stage, StageFault, StageId,
    StageSequence, Urgency,
};
use tracing::debug;

pub const MAX_ITERATIONS_WARNING: &str = "max iterations reached";
pub const TOO_MANY_ERRORS_WARNING: &str = "too many errors";
pub const EMERGENCY_WARNING: &str = "EMERGENCY: seek immediate attention";

/// Policy constants the supervisor decides by.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorPolicy {
    pub max_iterations: u32,
    pub max_errors: usize,
    pub red_flag_threshold: usize,
    /// End with `ask_clarification` when the lap finished without extracted items.
    pub clarify_when_empty: bool,
}

impl From<&PipelineConfig> for SupervisorPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            max_errors: config.max_errors,
            red_flag_threshold: config.red_flag_threshold,
            clarify_when_empty: config.clarify_when_empty,
        }
    }
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Emits the routing verdict after each lap.
#[derive(Debug, Clone)]
pub struct Supervisor {
    sequence: StageSequence,
    policy: SupervisorPolicy,
}

impl Supervisor {
    pub fn new(sequence: StageSequence, policy: SupervisorPolicy) -> Self {
        Self { sequence, policy }
    }

    pub fn sequence(&self) -> &StageSequence {
        &self.sequence
    }

    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    /// Computes the verdict for `record`. Pure.
    pub fn decide(&self, record: &SharedStateRecord) -> PartialUpdate {
        if record.iteration_count() >= self.policy.max_iterations {
            return PartialUpdate::verdict(NextAction::End).with_warning(MAX_ITERATIONS_WARNING);
        }
        if record.errors().len() >= self.policy.max_errors {
            return PartialUpdate::verdict(NextAction::End).with_warning(TOO_MANY_ERRORS_WARNING);
        }
        if record.derived().urgency == Some(Urgency::Emergency) {
            return PartialUpdate::verdict(NextAction::Escalate).with_warning(EMERGENCY_WARNING);
        }
        self.advance(record)
    }

    fn advance(&self, record: &SharedStateRecord) -> PartialUpdate {
        if record.has_run(self.sequence.last()) {
            if self.policy.clarify_when_empty && Self::needs_clarification(record) {
                return PartialUpdate::verdict(NextAction::AskClarification);
            }
            return PartialUpdate::verdict(NextAction::End);
        }

        match record.last_ordinary_stage() {
            None => PartialUpdate {
                next_stage: Some(self.sequence.first()),
                iteration_count: Some(0),
                ..PartialUpdate::verdict(NextAction::Continue)
            },
            Some(stage) => match self.sequence.after(stage) {
                // Resuming mid-sequence after a faulted stage starts a new lap.
                Some(next) => PartialUpdate {
                    next_stage: Some(next),
                    iteration_count: Some(record.iteration_count().saturating_add(1)),
                    ..PartialUpdate::verdict(NextAction::Continue)
                },
                None => PartialUpdate::verdict(NextAction::End),
            },
        }
    }

    /// `true` when nothing has been extracted from the input yet.
    pub fn needs_clarification(record: &SharedStateRecord) -> bool {
        record.derived().extracted_items.is_empty()
    }

    /// `true` when the case warrants escalation: emergency urgency, an
    /// immediate-care flag, or at least `red_flag_threshold` red flags.
    pub fn should_escalate(&self, record: &SharedStateRecord) -> bool {
        let derived = record.derived();
        derived.urgency == Some(Urgency::Emergency)
            || derived.requires_immediate_care
            || derived.red_flags.len() >= self.policy.red_flag_threshold
    }
}

#[async_trait]
impl Stage for Supervisor {
    fn id(&self) -> StageId {
        StageId::Supervisor
    }

    async fn execute(&self, record: &SharedStateRecord) -> Result<PartialUpdate, StageFault> {
        let update = self.decide(record);
        debug!(
            verdict = ?update.next_action,
            next_stage = ?update.next_stage,
            lap = record.iteration_count(),
            errors = record.errors().len(),
            "supervisor decided"
        );
        Ok(update)
    }
}
