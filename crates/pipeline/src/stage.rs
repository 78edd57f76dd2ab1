//! The stage contract.
//!
//! A [`Stage`] reads the whole record and returns only its own delta. It is a
//! function of the record plus its injected collaborators: configuration and
//! client handles may be cached at construction, but nothing that changes
//! between calls may affect the result.
//!
//! Expected content failures are reported inside the returned update (an
//! error entry); `Err(StageFault)` is reserved for faults the stage cannot
//! turn into content. The stage runner normalises both into the same delta
//! shape before the executor merges it.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{GeneratorError, PartialUpdate, SharedStateRecord, StageId};

/// A named unit of work in the assembly line.
#[async_trait]
pub trait Stage: Send + Sync {
    /// The identity the executor routes by.
    fn id(&self) -> StageId;

    /// Computes this stage's contribution for `record`.
    async fn execute(&self, record: &SharedStateRecord) -> Result<PartialUpdate, StageFault>;
}

/// A failure of one stage invocation.
#[derive(Debug, Error)]
pub enum StageFault {
    /// The content generator could not produce a result.
    #[error(transparent)]
    Generation(#[from] GeneratorError),

    /// The generator answered, but not in the shape the stage asked for.
    #[error("malformed content: {message}")]
    MalformedContent {
        /// What was wrong with the content.
        message: String,
    },

    /// The invocation exceeded the configured per-stage timeout.
    #[error("stage timed out after {}s", .after.as_secs_f64())]
    TimedOut {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The stage task panicked.
    #[error("stage panicked: {message}")]
    Panicked {
        /// The panic payload, when it was a string.
        message: String,
    },

    /// The stage task was cancelled before it produced a result.
    #[error("stage task was aborted")]
    Aborted,
}

impl StageFault {
    /// Convenience constructor for [`StageFault::MalformedContent`].
    pub fn malformed(message: impl Into<String>) -> Self {
        StageFault::MalformedContent {
            message: message.into(),
        }
    }
}
