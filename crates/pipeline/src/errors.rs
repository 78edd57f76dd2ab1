//! Top-level error and retry-policy types for the triage pipeline domain.
//!
//! [`TriageError`] covers conditions that prevent the executor itself from
//! producing a well-formed transition, plus invalid configuration rejected at
//! construction time. Per-invocation failures are [`crate::StageFault`]s and
//! collaborator failures are [`crate::GeneratorError`]s; both are recovered
//! inside a run and surface only as data in the record.
//!
//! [`RetryPolicy`] is a cross-cutting concern: infrastructure error types that
//! participate in retry decisions produce one.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::StageId;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// - `Retryable` errors: request timeouts, rate limiting, upstream 5xx.
/// - `NonRetryable` errors: authentication failures, malformed requests,
///   malformed responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Errors raised by the executor or by pipeline construction.
///
/// Construction-time variants ([`TriageError::ConfigurationError`],
/// [`TriageError::InvalidSequence`]) are returned to the caller. Run-time
/// variants never reach the caller as a propagated error: the executor turns
/// them into the safe-fallback record.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum TriageError {
    /// The pipeline configuration is invalid.
    ///
    /// Produced at load time; the pipeline never starts with an invalid config.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },

    /// The configured stage sequence is empty, repeats a stage, or names the supervisor.
    #[error("Invalid stage sequence: {message}")]
    InvalidSequence {
        /// Description of the sequence problem.
        message: String,
    },

    /// The supervisor stage faulted instead of producing a verdict.
    #[error("Supervisor fault: {message}")]
    SupervisorFault {
        /// The fault reported by the stage runner.
        message: String,
    },

    /// The supervisor's verdict cannot be turned into a transition
    /// (e.g. `continue` without a `next_stage`, or a stage outside the sequence).
    #[error("Malformed transition: {message}")]
    MalformedTransition {
        /// Description of the malformed verdict.
        message: String,
    },

    /// The executor was asked to run a stage it holds no implementation for.
    #[error("No implementation registered for stage {stage}")]
    MissingStage {
        /// The unresolvable stage.
        stage: StageId,
    },
}
