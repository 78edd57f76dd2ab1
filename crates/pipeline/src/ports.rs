//! Outbound ports to the content stages' external collaborators.
//!
//! Infrastructure crates implement these traits; the domain only sees the
//! trait objects. Both collaborators must be safe for concurrent use by
//! several simultaneous runs; their pooling and rate limiting are the
//! implementor's concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{RetryPolicy, ScoredDocument};

// ---------------------------------------------------------------------------
// Content generation
// ---------------------------------------------------------------------------

/// What shape of answer a prompt expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// A single JSON object.
    Json,
    /// Free text, returned as a JSON string.
    Text,
}

/// A prompt split into the instruction and the case-specific request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredPrompt {
    /// Role and rules for the generator.
    pub system: String,
    /// The case-specific request.
    pub user: String,
    /// Expected answer shape.
    pub format: ResponseFormat,
}

impl StructuredPrompt {
    /// A prompt expecting a JSON object.
    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ResponseFormat::Json,
        }
    }

    /// A prompt expecting free text.
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ResponseFormat::Text,
        }
    }
}

/// Failure of a [`ContentGenerator`] call.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum GeneratorError {
    /// No generator is configured or reachable.
    #[error("content generator unavailable: {message}")]
    Unavailable { message: String },

    /// The request was sent but failed.
    #[error("content generation failed: {message}")]
    RequestFailed {
        message: String,
        /// Whether the caller may try again.
        retry: RetryPolicy,
    },

    /// The generator answered with something that is not the requested format.
    #[error("content generator returned malformed output: {message}")]
    MalformedOutput { message: String },
}

/// Turns a structured prompt into a structured result.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generates a result for `prompt`.
    ///
    /// For [`ResponseFormat::Json`] prompts the value is the parsed object; for
    /// [`ResponseFormat::Text`] prompts it is a JSON string.
    async fn generate(&self, prompt: &StructuredPrompt) -> Result<Value, GeneratorError>;
}

// ---------------------------------------------------------------------------
// Knowledge lookup
// ---------------------------------------------------------------------------

/// Looks up documents relevant to a query.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Returns at most `k` documents, most relevant first.
    ///
    /// An empty result means "nothing available"; implementations never fail
    /// the calling stage.
    async fn search(&self, query: &str, k: usize) -> Vec<ScoredDocument>;
}
