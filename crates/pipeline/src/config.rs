//! Pipeline policy configuration.
//!
//! Loading is the composition root's job; this module only defines the shape,
//! the defaults, and validation. Every field has a default so a partial
//! document deserialises.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TriageError;

/// Limits and policy constants shared by the executor and the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Laps allowed before the run is forced to end.
    pub max_iterations: u32,
    /// Error entries allowed before the run is forced to end.
    pub max_errors: usize,
    /// Upper bound on a single stage invocation, in seconds.
    pub stage_timeout_secs: u64,
    /// Red flags at or above which the supervisor's `should_escalate` reports `true`.
    pub red_flag_threshold: usize,
    /// End with `ask_clarification` instead of `end` when nothing was extracted.
    pub clarify_when_empty: bool,
    /// Documents requested from the knowledge source per search.
    pub knowledge_results: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_errors: 3,
            stage_timeout_secs: 300,
            red_flag_threshold: 3,
            clarify_when_empty: true,
            knowledge_results: 5,
        }
    }
}

impl PipelineConfig {
    /// The per-stage timeout as a [`Duration`].
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    /// Rejects limits that would make every run terminate before its first stage.
    pub fn validate(&self) -> Result<(), TriageError> {
        if self.max_iterations == 0 {
            return Err(config_error("max_iterations must be at least 1"));
        }
        if self.max_errors == 0 {
            return Err(config_error("max_errors must be at least 1"));
        }
        if self.stage_timeout_secs == 0 {
            return Err(config_error("stage_timeout_secs must be at least 1"));
        }
        if self.red_flag_threshold == 0 {
            return Err(config_error("red_flag_threshold must be at least 1"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> TriageError {
    TriageError::ConfigurationError {
        message: message.to_string(),
    }
}
