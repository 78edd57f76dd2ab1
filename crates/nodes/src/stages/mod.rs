//! The five content stages of the standard assembly line.
//!
//! Each stage builds a [`StructuredPrompt`](pipeline::StructuredPrompt), asks
//! the injected [`ContentGenerator`](pipeline::ContentGenerator) for a JSON
//! answer, and maps it onto a [`PartialUpdate`](pipeline::PartialUpdate).
//! Generator failures surface as [`StageFault`]s unless the stage defines a
//! content fallback.

mod diagnostic_analyzer;
mod knowledge_retriever;
mod recommendation_generator;
mod risk_assessor;
mod symptom_extractor;

pub use diagnostic_analyzer::DiagnosticAnalyzer;
pub use knowledge_retriever::{KnowledgeRetriever, FAILED_SYNTHESIS, NO_KNOWLEDGE};
pub use recommendation_generator::{RecommendationGenerator, FALLBACK_ADVICE};
pub use risk_assessor::{RiskAssessor, FALLBACK_CARE_WINDOW};
pub use symptom_extractor::SymptomExtractor;

use pipeline::{Derived, StageFault, StageId};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialises a generator answer into the stage's expected shape.
pub(crate) fn parse_answer<T: DeserializeOwned>(stage: StageId, answer: Value) -> Result<T, StageFault> {
    serde_json::from_value(answer)
        .map_err(|e| StageFault::malformed(format!("{stage} answer did not match the expected shape: {e}")))
}

/// Patient attributes from the run context, one per line.
pub(crate) fn patient_profile(derived: &Derived) -> String {
    format!(
        "- Age: {}\n- Gender: {}\n- Medical history: {}\n- Current medications: {}\n- Allergies: {}",
        derived.extension_text("age").unwrap_or_else(|| "not provided".into()),
        derived.extension_text("gender").unwrap_or_else(|| "not provided".into()),
        joined_or_none(&derived.extension_list("medical_history")),
        joined_or_none(&derived.extension_list("current_medications")),
        joined_or_none(&derived.extension_list("allergies")),
    )
}

pub(crate) fn joined_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none reported".to_string()
    } else {
        items.join(", ")
    }
}

pub(crate) fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- none".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}


#[cfg(test)]
mod tests {
    use pipeline::{RunContext, SharedStateRecord};
    use serde_json::json;

    use super::*;

    #[test]
    fn profile_falls_back_for_missing_context() {
        let record = SharedStateRecord::new(
            "x",
            RunContext::new()
                .with("age", 41)
                .with("allergies", json!(["penicillin"])),
        );
        let profile = patient_profile(record.derived());
        assert!(profile.contains("- Age: 41"));
        assert!(profile.contains("- Gender: not provided"));
        assert!(profile.contains("- Allergies: penicillin"));
        assert!(profile.contains("- Medical history: none reported"));
    }

    #[test]
    fn malformed_answers_become_faults() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Shape {
            symptoms: Vec<String>,
        }
        let fault = parse_answer::<Shape>(StageId::SymptomExtractor, json!({"symptoms": "cough"}))
            .unwrap_err();
        assert!(matches!(fault, StageFault::MalformedContent { .. }));
    }
}
