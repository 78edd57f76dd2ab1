//! Run results: how a run terminated and the record handed back to callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ErrorEntry, NextAction, SharedStateRecord, Urgency};

/// Recommendation carried by the safe-fallback record.
pub const FALLBACK_RECOMMENDATION: &str = "We encountered an error processing your request. \
     Please consult a healthcare professional directly.";

/// Escalation criteria carried by the safe-fallback record.
pub const FALLBACK_ESCALATION: &str = "As soon as possible";

/// Escalation criteria used when no stage produced any.
pub const DEFAULT_ESCALATION: &str = "Consult a healthcare professional";

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// The supervisor issued a terminal verdict.
    Verdict { action: NextAction },
    /// The executor's iteration limit was reached.
    IterationLimit,
    /// The executor's error limit was reached.
    ErrorLimit,
    /// The caller cancelled the run between stages.
    Cancelled,
    /// The executor could not produce a well-formed transition.
    ExecutorFault { message: String },
}

impl Termination {
    /// Returns `true` when the record must be replaced by the safe fallback.
    pub fn requires_fallback(&self) -> bool {
        matches!(
            self,
            Termination::Cancelled | Termination::ExecutorFault { .. }
        )
    }
}

/// Everything a run produced, for callers that need more than the [`FinalRecord`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The record as it stood when the run stopped.
    pub record: SharedStateRecord,
    pub termination: Termination,
    /// Wall-clock time from the first transition to termination.
    pub elapsed: Duration,
}

/// The result shape that leaves the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecord {
    pub extracted_items: Vec<String>,
    pub analysis: Option<String>,
    pub urgency: Urgency,
    pub recommendations: Vec<String>,
    pub escalation_criteria: String,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    pub processing_time_secs: f64,
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<String>,
}

impl FinalRecord {
    /// Projects a run outcome, substituting the safe fallback where the
    /// termination requires it.
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        match &outcome.termination {
            Termination::Cancelled => {
                Self::safe_fallback(&outcome.record, "run cancelled", outcome.elapsed)
            }
            Termination::ExecutorFault { message } => Self::safe_fallback(
                &outcome.record,
                &format!("executor fault: {message}"),
                outcome.elapsed,
            ),
            _ => Self::from_record(&outcome.record, outcome.elapsed),
        }
    }

    /// Projects a record that reached a normal or policy termination.
    pub fn from_record(record: &SharedStateRecord, elapsed: Duration) -> Self {
        let derived = record.derived();
        let escalation_criteria = derived
            .escalation_criteria
            .clone()
            .or_else(|| derived.when_to_seek_care.clone())
            .unwrap_or_else(|| DEFAULT_ESCALATION.to_string());

        Self {
            extracted_items: derived.extracted_items.clone(),
            analysis: derived.analysis.clone(),
            urgency: derived.urgency.unwrap_or(Urgency::Unknown),
            recommendations: derived.recommendations.clone(),
            escalation_criteria,
            confidence: derived.confidence.map(|c| c.as_f64()).unwrap_or(0.0),
            processing_time_secs: elapsed.as_secs_f64(),
            errors: record.errors().to_vec(),
            warnings: record.warnings().to_vec(),
        }
    }

    /// The minimal, always-valid record returned when the executor cannot complete.
    ///
    /// Keeps the errors and warnings accumulated so far and adds `cause` as a warning.
    pub fn safe_fallback(record: &SharedStateRecord, cause: &str, elapsed: Duration) -> Self {
        let mut warnings = record.warnings().to_vec();
        warnings.push(cause.to_string());
        Self {
            extracted_items: Vec::new(),
            analysis: None,
            urgency: Urgency::Unknown,
            recommendations: vec![FALLBACK_RECOMMENDATION.to_string()],
            escalation_criteria: FALLBACK_ESCALATION.to_string(),
            confidence: 0.0,
            processing_time_secs: elapsed.as_secs_f64(),
            errors: record.errors().to_vec(),
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfidenceScore, DerivedUpdate, PartialUpdate, RunContext, StageId};

    fn populated() -> SharedStateRecord {
        let mut record = SharedStateRecord::new("cough", RunContext::new());
        record.apply(PartialUpdate {
            derived: DerivedUpdate {
                extracted_items: Some(vec!["cough".into()]),
                urgency: Some(Urgency::Low),
                confidence: Some(ConfidenceScore::clamped(0.6)),
                when_to_seek_care: Some("if it lasts a week".into()),
                ..DerivedUpdate::default()
            },
            ..PartialUpdate::default()
        });
        record.apply(PartialUpdate::default().with_error(StageId::KnowledgeRetriever, "offline"));
        record
    }

    #[test]
    fn projects_record_fields() {
        let fr = FinalRecord::from_record(&populated(), Duration::from_millis(1500));
        assert_eq!(fr.extracted_items, vec!["cough".to_string()]);
        assert_eq!(fr.urgency, Urgency::Low);
        assert_eq!(fr.confidence, 0.6);
        assert_eq!(fr.escalation_criteria, "if it lasts a week");
        assert_eq!(fr.processing_time_secs, 1.5);
        assert_eq!(fr.errors.len(), 1);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let record = SharedStateRecord::new("", RunContext::new());
        let fr = FinalRecord::from_record(&record, Duration::ZERO);
        assert_eq!(fr.urgency, Urgency::Unknown);
        assert_eq!(fr.confidence, 0.0);
        assert_eq!(fr.escalation_criteria, DEFAULT_ESCALATION);
    }

    #[test]
    fn fallback_outcomes_use_safe_record() {
        let outcome = RunOutcome {
            record: populated(),
            termination: Termination::ExecutorFault {
                message: "supervisor panicked".into(),
            },
            elapsed: Duration::from_secs(2),
        };
        let fr = FinalRecord::from_outcome(&outcome);

        assert!(fr.extracted_items.is_empty());
        assert_eq!(fr.urgency, Urgency::Unknown);
        assert_eq!(fr.recommendations, vec![FALLBACK_RECOMMENDATION.to_string()]);
        assert_eq!(fr.confidence, 0.0);
        assert_eq!(fr.processing_time_secs, 2.0);
        assert_eq!(fr.errors.len(), 1);
        assert!(fr.warnings.last().unwrap().contains("supervisor panicked"));
    }

    #[test]
    fn policy_terminations_keep_the_record() {
        let outcome = RunOutcome {
            record: populated(),
            termination: Termination::ErrorLimit,
            elapsed: Duration::ZERO,
        };
        assert!(!outcome.termination.requires_fallback());
        assert_eq!(FinalRecord::from_outcome(&outcome).extracted_items.len(), 1);
    }
}
