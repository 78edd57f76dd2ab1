//! Shared value types for the triage pipeline domain.
//!
//! Unlike the identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. confidence is in `[0.0, 1.0]`,
//! urgency levels are totally ordered) and participate in routing decisions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// The last routing verdict recorded on a [`SharedStateRecord`](crate::SharedStateRecord).
///
/// Content stages may set it as a hint; only the supervisor's value drives a
/// transition. A verdict that is absent from an update is treated as [`NextAction::End`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// Proceed to the stage named by the verdict's `next_stage`.
    #[default]
    Continue,
    /// Restart the configured sequence from its first stage as a new lap.
    Loop,
    /// Stop and hand the case to a human; also the verdict of a faulted stage.
    Escalate,
    /// Stop normally.
    End,
    /// Stop because the input carried nothing the pipeline could work with.
    AskClarification,
}

impl NextAction {
    /// Returns `true` for verdicts that terminate a run when issued by the supervisor.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NextAction::End | NextAction::Escalate | NextAction::AskClarification
        )
    }
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NextAction::Continue => "continue",
            NextAction::Loop => "loop",
            NextAction::Escalate => "escalate",
            NextAction::End => "end",
            NextAction::AskClarification => "ask_clarification",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How soon the case needs professional attention.
///
/// Ordered from least to most urgent so stages can keep the maximum of an
/// upstream and a locally computed level. [`Urgency::Unknown`] sorts lowest and
/// only appears in the safe-fallback record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Unknown,
    Low,
    Medium,
    High,
    Emergency,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Urgency::Unknown => "unknown",
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Emergency => "emergency",
        };
        f.write_str(s)
    }
}

/// Overall risk level reported by the risk assessment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// Parses a generator-supplied label, case-insensitively.
    ///
    /// Returns `None` for labels outside the four known levels.
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "moderate" | "medium" => Some(RiskLevel::Moderate),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Score types
// ---------------------------------------------------------------------------

/// Confidence of the analysis in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ConfidenceScore(f64);

impl ConfidenceScore {
    /// Creates a [`ConfidenceScore`], returning `None` if `value` is outside
    /// the valid range `[0.0, 1.0]`.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Creates a [`ConfidenceScore`] by clamping `value` into `[0.0, 1.0]`.
    ///
    /// Non-finite values map to zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_finite() {
            Self(value.clamp(0.0, 1.0))
        } else {
            Self(0.0)
        }
    }

    /// A score of exactly zero.
    pub fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the score as an `f64` in `[0.0, 1.0]`.
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Knowledge
// ---------------------------------------------------------------------------

/// A document returned by a [`KnowledgeSource`](crate::KnowledgeSource) search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// Document body.
    pub content: String,
    /// Human-readable origin (e.g. a title or URL); `"Unknown"` when absent.
    pub source: String,
    /// Similarity score as reported by the source; higher is more relevant.
    pub relevance_score: f64,
    /// Free-form metadata forwarded from the source.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ScoredDocument {
    /// Creates a document with empty metadata.
    pub fn new(content: impl Into<String>, source: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            relevance_score,
            metadata: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
