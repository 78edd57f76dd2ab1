use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, DerivedUpdate, NextAction, PartialUpdate, SharedStateRecord, Stage,
    StageFault, StageId, StructuredPrompt,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::parse_answer;
use crate::urgency;

const SYSTEM: &str = "You are a clinical intake assistant. Extract the symptoms described by the \
patient. Answer with a JSON object with the keys `symptoms` (list of short symptom names), \
`severity` (symptom -> integer 1-10), `duration` (symptom -> duration as described), and \
`entities` (object of other medically relevant details: body parts, triggers, medications). \
Only report what the patient actually said.";

#[derive(Debug, Deserialize)]
struct Extraction {
    symptoms: Vec<String>,
    #[serde(default)]
    severity: BTreeMap<String, f64>,
    #[serde(default)]
    duration: BTreeMap<String, String>,
    #[serde(default)]
    entities: Map<String, Value>,
}

/// Turns the raw input into extracted items with severities, durations, and a first urgency.
pub struct SymptomExtractor {
    generator: Arc<dyn ContentGenerator>,
}

impl SymptomExtractor {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for SymptomExtractor {
    fn id(&self) -> StageId {
        StageId::SymptomExtractor
    }

    async fn execute(&self, record: &SharedStateRecord) -> Result<PartialUpdate, StageFault> {
        let input = record.input().trim();
        if input.is_empty() {
            debug!("blank input; asking for clarification");
            return Ok(PartialUpdate {
                derived: DerivedUpdate {
                    extracted_items: Some(Vec::new()),
                    ..DerivedUpdate::default()
                },
                ..PartialUpdate::verdict(NextAction::AskClarification)
            });
        }

        let prompt = StructuredPrompt::json(SYSTEM, format!("Patient description:\n{input}"));
        let answer = self.generator.generate(&prompt).await?;
        let extraction: Extraction = parse_answer(self.id(), answer)?;

        let severity: BTreeMap<String, u8> = extraction
            .severity
            .into_iter()
            .map(|(item, score)| (item, score.round().clamp(1.0, 10.0) as u8))
            .collect();
        let max_severity = severity.values().copied().max().unwrap_or(0);
        let urgency = urgency::from_symptoms(&extraction.symptoms, max_severity);
        let next_action = if extraction.symptoms.is_empty() {
            NextAction::AskClarification
        } else {
            NextAction::Continue
        };

        debug!(
            items = extraction.symptoms.len(),
            max_severity,
            urgency = %urgency,
            "symptoms extracted"
        );

        let mut derived = DerivedUpdate {
            extracted_items: Some(extraction.symptoms),
            severity: Some(severity),
            duration: Some(extraction.duration),
            urgency: Some(urgency),
            ..DerivedUpdate::default()
        };
        if !extraction.entities.is_empty() {
            derived
                .extensions
                .insert("entities".to_string(), Value::Object(extraction.entities));
        }

        Ok(PartialUpdate {
            derived,
            ..PartialUpdate::verdict(next_action)
        })
    }
}
