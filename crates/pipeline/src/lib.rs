//! Core orchestration domain for the triage assembly line.
//!
//! This crate contains the shared state record, the stage contract, the port
//! traits for external collaborators, and the value and error types used
//! throughout the pipeline. Infrastructure crates implement the traits defined
//! here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `StageId`, `RunId`, caller identity newtypes |
//! | [`types`] | Value types (`Urgency`, `NextAction`, `ConfidenceScore`, etc.) |
//! | [`sequence`] | The ordered table of ordinary stages |
//! | [`state`] | `SharedStateRecord`, `PartialUpdate`, merge rules |
//! | [`stage`] | The `Stage` trait and `StageFault` |
//! | [`ports`] | `ContentGenerator` and `KnowledgeSource` |
//! | [`config`] | `PipelineConfig` limits and policy constants |
//! | [`outcome`] | `RunOutcome`, `Termination`, `FinalRecord` |
//! | [`errors`] | Executor-level error and retry-policy types |

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod outcome;
pub mod ports;
pub mod sequence;
pub mod stage;
pub mod state;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::PipelineConfig;
pub use errors::{RetryPolicy, TriageError};
pub use identifiers::{RunId, SessionId, StageId, UserId};
pub use outcome::{
    FinalRecord, RunOutcome, Termination, DEFAULT_ESCALATION, FALLBACK_ESCALATION,
    FALLBACK_RECOMMENDATION,
};
pub use ports::{ContentGenerator, GeneratorError, KnowledgeSource, ResponseFormat, StructuredPrompt};
pub use sequence::StageSequence;
pub use stage::{Stage, StageFault};
pub use state::{Derived, DerivedUpdate, ErrorEntry, PartialUpdate, RunContext, SharedStateRecord};
pub use types::{ConfidenceScore, NextAction, RiskLevel, ScoredDocument, Timestamp, Urgency};
