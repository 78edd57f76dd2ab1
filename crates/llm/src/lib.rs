//! Triage content generator infrastructure adapter.
//!
//! Implements [`pipeline::ContentGenerator`] over any OpenAI-compatible
//! chat-completions endpoint. Other providers are added as new types in this
//! crate without any changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing,
//! `Retry-After` handling, and exponential back-off live here. The
//! [`pipeline`] crate sees only [`pipeline::ContentGenerator`].

mod client;
mod config;
mod error;
mod wire;

pub use client::{backoff_delay, HttpContentGenerator, BASE_BACKOFF};
pub use config::LlmConfig;
pub use error::LlmError;
