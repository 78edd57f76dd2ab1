use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ConfidenceScore, ContentGenerator, DerivedUpdate, NextAction, PartialUpdate,
    SharedStateRecord, Stage, StageFault, StageId, StructuredPrompt,
};
use serde::Deserialize;
use tracing::debug;

use super::{bullet_list, parse_answer, patient_profile};

const SYSTEM: &str = "You are a careful clinical reasoning assistant. Given symptoms, patient \
details, and reference knowledge, list possible conditions. Answer with a JSON object with the \
keys `preliminary_diagnoses` (list), `confidence_scores` (condition -> number between 0 and 1), \
`reasoning` (short explanation), and `requires_immediate_care` (boolean). These are \
possibilities for a professional to evaluate, never a diagnosis.";

#[derive(Debug, Deserialize)]
struct Analysis {
    preliminary_diagnoses: Vec<String>,
    #[serde(default)]
    confidence_scores: BTreeMap<String, f64>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    requires_immediate_care: bool,
}

/// Produces preliminary findings, the reasoning behind them, and a confidence score.
pub struct DiagnosticAnalyzer {
    generator: Arc<dyn ContentGenerator>,
}

impl DiagnosticAnalyzer {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

/// Mean of the scores, clamped to `[0, 1]`; zero when there are none.
fn mean_confidence(scores: &BTreeMap<String, f64>) -> ConfidenceScore {
    let finite: Vec<f64> = scores.values().copied().filter(|s| s.is_finite()).collect();
    if finite.is_empty() {
        return ConfidenceScore::zero();
    }
    ConfidenceScore::clamped(finite.iter().sum::<f64>() / finite.len() as f64)
}

#[async_trait]
impl Stage for DiagnosticAnalyzer {
    fn id(&self) -> StageId {
        StageId::DiagnosticAnalyzer
    }

    async fn execute(&self, record: &SharedStateRecord) -> Result<PartialUpdate, StageFault> {
        let derived = record.derived();
        if derived.extracted_items.is_empty() {
            return Ok(PartialUpdate {
                derived: DerivedUpdate {
                    findings: Some(Vec::new()),
                    confidence: Some(ConfidenceScore::zero()),
                    ..DerivedUpdate::default()
                },
                ..PartialUpdate::verdict(NextAction::AskClarification)
            });
        }

        let symptoms = derived
            .extracted_items
            .iter()
            .map(|item| match derived.severity.get(item) {
                Some(severity) => format!("{item} (severity {severity}/10)"),
                None => item.clone(),
            })
            .collect::<Vec<_>>();
        let knowledge = derived
            .synthesized_knowledge
            .as_deref()
            .unwrap_or("No knowledge retrieved");
        let prompt = StructuredPrompt::json(
            SYSTEM,
            format!(
                "Symptoms:\n{}\n\nPatient:\n{}\n\nReference knowledge:\n{}",
                bullet_list(&symptoms),
                patient_profile(derived),
                knowledge
            ),
        );

        let answer = self.generator.generate(&prompt).await?;
        let analysis: Analysis = parse_answer(self.id(), answer)?;
        let confidence = mean_confidence(&analysis.confidence_scores);

        debug!(
            findings = analysis.preliminary_diagnoses.len(),
            confidence = confidence.as_f64(),
            requires_immediate_care = analysis.requires_immediate_care,
            "analysis complete"
        );

        let mut update = PartialUpdate {
            derived: DerivedUpdate {
                findings: Some(analysis.preliminary_diagnoses),
                analysis: Some(analysis.reasoning),
                requires_immediate_care: Some(analysis.requires_immediate_care),
                confidence: Some(confidence),
                ..DerivedUpdate::default()
            },
            ..PartialUpdate::default()
        };
        update.derived.extensions.insert(
            "confidence_scores".to_string(),
            serde_json::to_value(&analysis.confidence_scores)
                .map_err(|e| StageFault::malformed(e.to_string()))?,
        );
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use pipeline::RunContext;
    use serde_json::json;

    use super::*;
    use crate::stages::testing::ScriptedGenerator;

    fn record_with_items() -> SharedStateRecord {
        let mut record = SharedStateRecord::new("sore throat", RunContext::new().with("age", 29));
        record.apply(PartialUpdate {
            derived: DerivedUpdate {
                extracted_items: Some(vec!["sore throat".into()]),
                severity: Some([("sore throat".to_string(), 4u8)].into()),
                ..DerivedUpdate::default()
            },
            ..PartialUpdate::default()
        });
        record
    }

    #[test]
    fn confidence_is_the_clamped_mean() {
        let scores: BTreeMap<String, f64> =
            [("a".to_string(), 0.4), ("b".to_string(), 0.8)].into();
        assert!((mean_confidence(&scores).as_f64() - 0.6).abs() < 1e-9);

        let wild: BTreeMap<String, f64> = [("a".to_string(), 7.0)].into();
        assert_eq!(mean_confidence(&wild).as_f64(), 1.0);
        assert_eq!(mean_confidence(&BTreeMap::new()).as_f64(), 0.0);
    }

    #[tokio::test]
    async fn no_items_asks_for_clarification_without_generating() {
        let generator = Arc::new(ScriptedGenerator::default());
        let update = DiagnosticAnalyzer::new(generator.clone())
            .execute(&SharedStateRecord::new("", RunContext::new()))
            .await
            .unwrap();

        assert_eq!(generator.calls(), 0);
        assert_eq!(update.next_action, Some(NextAction::AskClarification));
        assert_eq!(update.derived.confidence, Some(ConfidenceScore::zero()));
    }

    #[tokio::test]
    async fn analysis_maps_onto_derived_fields() {
        let generator = Arc::new(ScriptedGenerator::answering(vec![Ok(json!({
            "preliminary_diagnoses": ["pharyngitis", "common cold"],
            "confidence_scores": {"pharyngitis": 0.7, "common cold": 0.5},
            "reasoning": "localised throat pain without fever",
            "requires_immediate_care": false
        }))]));
        let update = DiagnosticAnalyzer::new(generator.clone())
            .execute(&record_with_items())
            .await
            .unwrap();

        let derived = update.derived;
        assert_eq!(derived.findings.unwrap().len(), 2);
        assert_eq!(derived.analysis.as_deref(), Some("localised throat pain without fever"));
        assert!((derived.confidence.unwrap().as_f64() - 0.6).abs() < 1e-9);
        assert_eq!(derived.requires_immediate_care, Some(false));

        let prompt = &generator.prompts.lock().unwrap()[0];
        assert!(prompt.user.contains("sore throat (severity 4/10)"));
        assert!(prompt.user.contains("- Age: 29"));
        assert!(prompt.user.contains("No knowledge retrieved"));
    }
}
