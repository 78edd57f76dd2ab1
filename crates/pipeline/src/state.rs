//! The shared state record threaded through a run, and the partial updates
//! stages contribute to it.
//!
//! ## Merge rules
//!
//! | Field | Rule |
//! |-------|------|
//! | `derived` known fields | a present value in the update overwrites |
//! | `derived.extensions` | JSON objects merge key by key; other values overwrite at that depth; keys are never removed |
//! | `history`, `errors`, `warnings` | the update's entries are appended |
//! | `iteration_count` | `max(current, proposed)`; never decreases |
//! | `next_action` | a present value overwrites |
//!
//! `current_stage` is not stored: it is the last element of `history`, so the
//! two can never disagree. Merging [`PartialUpdate::default()`] is a no-op.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ConfidenceScore, NextAction, RiskLevel, RunId, ScoredDocument, SessionId, StageId, Timestamp,
    Urgency, UserId,
};

// ---------------------------------------------------------------------------
// Derived data
// ---------------------------------------------------------------------------

/// Stage-produced data accumulated over a run.
///
/// The known fields are the ones the supervisor and the final record read;
/// anything else a stage wants to hand downstream goes in `extensions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    /// Items extracted from the input (symptoms).
    pub extracted_items: Vec<String>,
    /// Per-item severity on a 1–10 scale.
    pub severity: BTreeMap<String, u8>,
    /// Per-item duration as described by the user.
    pub duration: BTreeMap<String, String>,
    /// Latest urgency classification.
    pub urgency: Option<Urgency>,
    /// Set by analysis when the case needs immediate professional attention.
    pub requires_immediate_care: bool,
    /// Documents retrieved from the knowledge source.
    pub documents: Vec<ScoredDocument>,
    /// Generator summary of the retrieved documents.
    pub synthesized_knowledge: Option<String>,
    /// Preliminary findings (possible conditions).
    pub findings: Vec<String>,
    /// Free-text analysis backing the findings.
    pub analysis: Option<String>,
    /// Overall risk level.
    pub risk_level: Option<RiskLevel>,
    /// Warning signs flagged as requiring immediate attention.
    pub red_flags: Vec<String>,
    /// Recommendations for the user.
    pub recommendations: Vec<String>,
    /// When the user should escalate to emergency care.
    pub escalation_criteria: Option<String>,
    /// When the user should see a professional.
    pub when_to_seek_care: Option<String>,
    /// Confidence of the analysis.
    pub confidence: Option<ConfidenceScore>,
    /// Open, stage-defined data. Seeded from the run context.
    pub extensions: BTreeMap<String, Value>,
}

impl Derived {
    fn apply(&mut self, update: DerivedUpdate) {
        if let Some(v) = update.extracted_items {
            self.extracted_items = v;
        }
        if let Some(v) = update.severity {
            self.severity = v;
        }
        if let Some(v) = update.duration {
            self.duration = v;
        }
        if let Some(v) = update.urgency {
            self.urgency = Some(v);
        }
        if let Some(v) = update.requires_immediate_care {
            self.requires_immediate_care = v;
        }
        if let Some(v) = update.documents {
            self.documents = v;
        }
        if let Some(v) = update.synthesized_knowledge {
            self.synthesized_knowledge = Some(v);
        }
        if let Some(v) = update.findings {
            self.findings = v;
        }
        if let Some(v) = update.analysis {
            self.analysis = Some(v);
        }
        if let Some(v) = update.risk_level {
            self.risk_level = Some(v);
        }
        if let Some(v) = update.red_flags {
            self.red_flags = v;
        }
        if let Some(v) = update.recommendations {
            self.recommendations = v;
        }
        if let Some(v) = update.escalation_criteria {
            self.escalation_criteria = Some(v);
        }
        if let Some(v) = update.when_to_seek_care {
            self.when_to_seek_care = Some(v);
        }
        if let Some(v) = update.confidence {
            self.confidence = Some(v);
        }
        for (key, value) in update.extensions {
            match self.extensions.get_mut(&key) {
                Some(slot) => merge_value(slot, value),
                None => {
                    self.extensions.insert(key, value);
                }
            }
        }
    }

    /// Returns an extension value rendered as display text.
    ///
    /// Strings are returned verbatim, numbers and booleans via their JSON form;
    /// `null`, arrays, objects and missing keys yield `None`.
    pub fn extension_text(&self, key: &str) -> Option<String> {
        match self.extensions.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Returns an extension value as a list of strings.
    ///
    /// Non-string array elements are skipped; a missing key or a non-array
    /// value yields an empty list.
    pub fn extension_list(&self, key: &str) -> Vec<String> {
        match self.extensions.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn merge_value(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

/// The `derived` part of a [`PartialUpdate`]. Absent fields leave the record untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedUpdate {
    pub extracted_items: Option<Vec<String>>,
    pub severity: Option<BTreeMap<String, u8>>,
    pub duration: Option<BTreeMap<String, String>>,
    pub urgency: Option<Urgency>,
    pub requires_immediate_care: Option<bool>,
    pub documents: Option<Vec<ScoredDocument>>,
    pub synthesized_knowledge: Option<String>,
    pub findings: Option<Vec<String>>,
    pub analysis: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub red_flags: Option<Vec<String>>,
    pub recommendations: Option<Vec<String>>,
    pub escalation_criteria: Option<String>,
    pub when_to_seek_care: Option<String>,
    pub confidence: Option<ConfidenceScore>,
    pub extensions: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Errors recorded in the state
// ---------------------------------------------------------------------------

/// A failure recorded against the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub stage: StageId,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(stage: StageId, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

// ---------------------------------------------------------------------------
// Partial update
// ---------------------------------------------------------------------------

/// The delta one stage invocation contributes to the record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialUpdate {
    pub derived: DerivedUpdate,
    /// Stage ids to append to `history`. Written by the stage runner.
    pub history: Vec<StageId>,
    /// Error entries to append.
    pub errors: Vec<ErrorEntry>,
    /// Warnings to append.
    pub warnings: Vec<String>,
    /// Proposed iteration count; applied as `max(current, proposed)`.
    pub iteration_count: Option<u32>,
    pub next_action: Option<NextAction>,
    /// Routing target of a supervisor `continue`. Consumed by the executor, never stored.
    pub next_stage: Option<StageId>,
}

impl PartialUpdate {
    /// An update carrying only a routing verdict.
    pub fn verdict(next_action: NextAction) -> Self {
        Self {
            next_action: Some(next_action),
            ..Self::default()
        }
    }

    /// Appends an error entry.
    pub fn with_error(mut self, stage: StageId, message: impl Into<String>) -> Self {
        self.errors.push(ErrorEntry::new(stage, message));
        self
    }

    /// Appends a warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Sets the verdict.
    pub fn with_next_action(mut self, next_action: NextAction) -> Self {
        self.next_action = Some(next_action);
        self
    }

    /// Returns `true` if merging this update would leave any record unchanged.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Caller-supplied fields seeded into `derived.extensions` before the first stage.
///
/// Opaque to the executor. Content stages read the well-known keys `age`,
/// `gender`, `medical_history`, `current_medications`, and `allergies`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunContext {
    fields: BTreeMap<String, Value>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Adds or replaces a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// The caller's user, if supplied under `user_id`.
    pub fn user_id(&self) -> Option<UserId> {
        self.fields
            .get("user_id")
            .and_then(Value::as_str)
            .and_then(UserId::new)
    }

    /// The caller's session, if supplied under `session_id`.
    pub fn session_id(&self) -> Option<SessionId> {
        self.fields
            .get("session_id")
            .and_then(Value::as_str)
            .and_then(SessionId::new)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for RunContext {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

// ---------------------------------------------------------------------------
// Shared state record
// ---------------------------------------------------------------------------

/// The single mutable value threaded through a run.
///
/// Created once per unit of work, exclusively owned by the executor while the
/// run is in flight, and mutated only through [`SharedStateRecord::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedStateRecord {
    run_id: RunId,
    started_at: Timestamp,
    input: String,
    derived: Derived,
    history: Vec<StageId>,
    errors: Vec<ErrorEntry>,
    warnings: Vec<String>,
    iteration_count: u32,
    next_action: NextAction,
}

impl SharedStateRecord {
    /// Creates a fresh record for `input` with the context merged into `derived.extensions`.
    pub fn new(input: impl Into<String>, context: RunContext) -> Self {
        let derived = Derived {
            extensions: context.fields,
            ..Derived::default()
        };
        Self {
            run_id: RunId::new_random(),
            started_at: Timestamp::now(),
            input: input.into(),
            derived,
            history: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            iteration_count: 0,
            next_action: NextAction::Continue,
        }
    }

    /// Merges `update` into the record following the module-level rules.
    pub fn apply(&mut self, update: PartialUpdate) {
        let PartialUpdate {
            derived,
            history,
            errors,
            warnings,
            iteration_count,
            next_action,
            next_stage: _,
        } = update;

        if !errors.is_empty() {
            tracing::debug!(
                run_id = %self.run_id,
                new_errors = errors.len(),
                total_errors = self.errors.len() + errors.len(),
                "recording stage errors"
            );
        }

        self.derived.apply(derived);
        self.history.extend(history);
        self.errors.extend(errors);
        self.warnings.extend(warnings);
        if let Some(count) = iteration_count {
            self.iteration_count = self.iteration_count.max(count);
        }
        if let Some(action) = next_action {
            self.next_action = action;
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// The originating request payload; immutable for the record's lifetime.
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn derived(&self) -> &Derived {
        &self.derived
    }

    /// Stages that completed successfully, in order. Supervisor evaluations included.
    pub fn history(&self) -> &[StageId] {
        &self.history
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Completed laps through the ordinary stage sequence.
    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn next_action(&self) -> NextAction {
        self.next_action
    }

    /// The stage most recently run, i.e. the last element of `history`.
    pub fn current_stage(&self) -> Option<StageId> {
        self.history.last().copied()
    }

    /// The most recent non-supervisor stage in `history`.
    pub fn last_ordinary_stage(&self) -> Option<StageId> {
        self.history.iter().rev().copied().find(|s| !s.is_supervisor())
    }

    /// Returns `true` if `stage` has completed at least once during the run.
    pub fn has_run(&self, stage: StageId) -> bool {
        self.history.contains(&stage)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record() -> SharedStateRecord {
        SharedStateRecord::new("headache for two days", RunContext::new().with("age", 34))
    }

    #[test]
    fn new_record_is_empty_and_seeded() {
        let r = record();
        assert!(r.history().is_empty());
        assert!(r.errors().is_empty());
        assert!(r.warnings().is_empty());
        assert_eq!(r.iteration_count(), 0);
        assert_eq!(r.next_action(), NextAction::Continue);
        assert_eq!(r.current_stage(), None);
        assert_eq!(r.derived().extension_text("age").as_deref(), Some("34"));
    }

    #[test]
    fn merging_an_empty_update_leaves_the_record_unchanged() {
        let mut r = record();
        r.apply(
            PartialUpdate {
                history: vec![StageId::SymptomExtractor],
                ..PartialUpdate::default()
            }
            .with_warning("first"),
        );
        let before = r.clone();

        let empty = PartialUpdate::default();
        assert!(empty.is_empty());
        r.apply(empty);

        assert_eq!(r, before);
    }

    #[test]
    fn append_only_fields_accumulate() {
        let mut r = record();
        r.apply(PartialUpdate::default().with_error(StageId::RiskAssessor, "boom"));
        r.apply(PartialUpdate::default().with_error(StageId::DiagnosticAnalyzer, "bang"));
        r.apply(PartialUpdate::default().with_warning("w"));

        assert_eq!(r.errors().len(), 2);
        assert_eq!(r.errors()[0].to_string(), "RiskAssessor: boom");
        assert_eq!(r.warnings(), ["w".to_string()]);
    }

    #[test]
    fn current_stage_tracks_last_history_entry() {
        let mut r = record();
        r.apply(PartialUpdate {
            history: vec![StageId::SymptomExtractor],
            ..PartialUpdate::default()
        });
        r.apply(PartialUpdate {
            history: vec![StageId::Supervisor],
            ..PartialUpdate::default()
        });
        assert_eq!(r.current_stage(), Some(StageId::Supervisor));
        assert_eq!(r.last_ordinary_stage(), Some(StageId::SymptomExtractor));
        assert!(r.has_run(StageId::SymptomExtractor));
    }

    #[test]
    fn iteration_count_never_decreases() {
        let mut r = record();
        r.apply(PartialUpdate {
            iteration_count: Some(3),
            ..PartialUpdate::default()
        });
        r.apply(PartialUpdate {
            iteration_count: Some(0),
            ..PartialUpdate::default()
        });
        assert_eq!(r.iteration_count(), 3);
    }

    #[test]
    fn derived_fields_overwrite_only_when_present() {
        let mut r = record();
        r.apply(PartialUpdate {
            derived: DerivedUpdate {
                extracted_items: Some(vec!["headache".into()]),
                urgency: Some(Urgency::Medium),
                ..DerivedUpdate::default()
            },
            ..PartialUpdate::default()
        });
        r.apply(PartialUpdate {
            derived: DerivedUpdate {
                analysis: Some("tension".into()),
                ..DerivedUpdate::default()
            },
            ..PartialUpdate::default()
        });

        let d = r.derived();
        assert_eq!(d.extracted_items, vec!["headache".to_string()]);
        assert_eq!(d.urgency, Some(Urgency::Medium));
        assert_eq!(d.analysis.as_deref(), Some("tension"));
    }

    #[test]
    fn extensions_merge_per_key_at_each_depth() {
        let mut r = record();
        let mut first = DerivedUpdate::default();
        first
            .extensions
            .insert("risk".into(), json!({"factors": ["smoking"], "advice": "rest"}));
        r.apply(PartialUpdate {
            derived: first,
            ..PartialUpdate::default()
        });

        let mut second = DerivedUpdate::default();
        second
            .extensions
            .insert("risk".into(), json!({"advice": "hydrate", "score": 2}));
        r.apply(PartialUpdate {
            derived: second,
            ..PartialUpdate::default()
        });

        assert_eq!(
            r.derived().extensions["risk"],
            json!({"factors": ["smoking"], "advice": "hydrate", "score": 2})
        );
        assert_eq!(r.derived().extension_text("age").as_deref(), Some("34"));
    }

    #[test]
    fn next_stage_is_not_stored() {
        let mut r = record();
        let before = r.clone();
        r.apply(PartialUpdate {
            next_stage: Some(StageId::RiskAssessor),
            ..PartialUpdate::default()
        });
        assert_eq!(r, before);
    }

    #[test]
    fn context_exposes_caller_identities() {
        let ctx = RunContext::new()
            .with("user_id", "u-7")
            .with("session_id", "");
        assert_eq!(ctx.user_id().unwrap().as_str(), "u-7");
        assert!(ctx.session_id().is_none());
    }

    #[test]
    fn extension_list_skips_non_strings() {
        let r = SharedStateRecord::new(
            "x",
            RunContext::new().with("allergies", json!(["penicillin", 3, "latex"])),
        );
        assert_eq!(
            r.derived().extension_list("allergies"),
            vec!["penicillin".to_string(), "latex".to_string()]
        );
        assert!(r.derived().extension_list("missing").is_empty());
    }
}
