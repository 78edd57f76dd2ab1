//! The ordered table of ordinary stages a run walks through.

use serde::{Deserialize, Serialize};

use crate::{StageId, TriageError};

/// An ordered, non-empty, duplicate-free list of ordinary stages.
///
/// The supervisor is never part of the sequence; control passes to it after the
/// last entry. `after` is the identity → next-identity table the executor and the
/// supervisor both route by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StageId>", into = "Vec<StageId>")]
pub struct StageSequence {
    stages: Vec<StageId>,
}

impl StageSequence {
    /// Validates and wraps `stages`.
    pub fn new(stages: Vec<StageId>) -> Result<Self, TriageError> {
        if stages.is_empty() {
            return Err(TriageError::InvalidSequence {
                message: "sequence must contain at least one stage".to_string(),
            });
        }
        if stages.iter().any(|s| s.is_supervisor()) {
            return Err(TriageError::InvalidSequence {
                message: "the supervisor cannot be an ordinary stage".to_string(),
            });
        }
        for (i, stage) in stages.iter().enumerate() {
            if stages[..i].contains(stage) {
                return Err(TriageError::InvalidSequence {
                    message: format!("stage {stage} appears more than once"),
                });
            }
        }
        Ok(Self { stages })
    }

    /// The five content stages in assembly-line order.
    pub fn standard() -> Self {
        Self {
            stages: vec![
                StageId::SymptomExtractor,
                StageId::KnowledgeRetriever,
                StageId::DiagnosticAnalyzer,
                StageId::RiskAssessor,
                StageId::RecommendationGenerator,
            ],
        }
    }

    /// The stage every lap starts from.
    pub fn first(&self) -> StageId {
        self.stages[0]
    }

    /// The stage after which control passes to the supervisor.
    pub fn last(&self) -> StageId {
        self.stages[self.stages.len() - 1]
    }

    /// The stage following `stage`, or `None` if `stage` is last or not in the sequence.
    pub fn after(&self, stage: StageId) -> Option<StageId> {
        let index = self.position(stage)?;
        self.stages.get(index + 1).copied()
    }

    /// Zero-based position of `stage`, if it belongs to the sequence.
    pub fn position(&self, stage: StageId) -> Option<usize> {
        self.stages.iter().position(|s| *s == stage)
    }

    /// Returns `true` if `stage` belongs to the sequence.
    pub fn contains(&self, stage: StageId) -> bool {
        self.stages.contains(&stage)
    }

    /// Number of ordinary stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always `false`; a sequence is non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterates the stages in order.
    pub fn iter(&self) -> impl Iterator<Item = StageId> + '_ {
        self.stages.iter().copied()
    }
}

impl TryFrom<Vec<StageId>> for StageSequence {
    type Error = TriageError;

    fn try_from(stages: Vec<StageId>) -> Result<Self, Self::Error> {
        Self::new(stages)
    }
}

impl From<StageSequence> for Vec<StageId> {
    fn from(sequence: StageSequence) -> Self {
        sequence.stages
    }
}
