//! Domain identifiers.
//!
//! Stage identity is a closed enum: routing decisions compare [`StageId`] values,
//! never strings, so a misspelled stage name cannot silently fall through the
//! state machine. Run and caller identities are newtypes so a [`SessionId`]
//! cannot be passed where a [`UserId`] is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Stage identity
// ---------------------------------------------------------------------------

/// Identifies a stage the executor can route to.
///
/// The five content stages form the standard assembly line; [`StageId::Supervisor`]
/// is the distinguished routing stage and never appears in a
/// [`StageSequence`](crate::StageSequence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageId {
    /// Turns the raw input into extracted items with severities and durations.
    SymptomExtractor,
    /// Looks up supporting documents for the extracted items.
    KnowledgeRetriever,
    /// Produces preliminary findings, reasoning, and a confidence score.
    DiagnosticAnalyzer,
    /// Classifies risk and the final urgency.
    RiskAssessor,
    /// Produces recommendations and escalation criteria.
    RecommendationGenerator,
    /// Inspects the record after each lap and emits the routing verdict.
    Supervisor,
}

impl StageId {
    /// Every stage identity, in standard assembly-line order with the supervisor last.
    pub const ALL: [StageId; 6] = [
        StageId::SymptomExtractor,
        StageId::KnowledgeRetriever,
        StageId::DiagnosticAnalyzer,
        StageId::RiskAssessor,
        StageId::RecommendationGenerator,
        StageId::Supervisor,
    ];

    /// Returns the stable name used in logs, error entries, and serialised records.
    pub fn as_str(self) -> &'static str {
        match self {
            StageId::SymptomExtractor => "SymptomExtractor",
            StageId::KnowledgeRetriever => "KnowledgeRetriever",
            StageId::DiagnosticAnalyzer => "DiagnosticAnalyzer",
            StageId::RiskAssessor => "RiskAssessor",
            StageId::RecommendationGenerator => "RecommendationGenerator",
            StageId::Supervisor => "Supervisor",
        }
    }

    /// Returns `true` for the routing stage.
    pub fn is_supervisor(self) -> bool {
        self == StageId::Supervisor
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single pipeline run (one unit of work).
///
/// Generated fresh for every record; propagated through spans so all activity
/// from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`RunId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: string-backed (caller supplied)
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies the end user on whose behalf a run is made.
    UserId
}

string_id! {
    /// Identifies a caller-side conversation session spanning several runs.
    SessionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_match_serialised_form() {
        for id in StageId::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.as_str()));
        }
    }

    #[test]
    fn only_supervisor_is_supervisor() {
        assert!(StageId::Supervisor.is_supervisor());
        assert_eq!(StageId::ALL.iter().filter(|id| id.is_supervisor()).count(), 1);
    }

    #[test]
    fn string_ids_reject_empty_values() {
        assert!(UserId::new("").is_none());
        assert_eq!(SessionId::new("s-1").unwrap().as_str(), "s-1");
    }
}
