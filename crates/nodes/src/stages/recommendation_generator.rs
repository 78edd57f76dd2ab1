use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, DerivedUpdate, PartialUpdate, SharedStateRecord, Stage, StageFault, StageId,
    StructuredPrompt,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{bullet_list, parse_answer, patient_profile};

/// Sole recommendation recorded when none could be generated.
pub const FALLBACK_ADVICE: &str =
    "Please consult with a healthcare professional for personalized recommendations.";

const SYSTEM: &str = "You give safe, practical self-care guidance for a triage case. Answer with \
a JSON object with the keys `immediate_actions`, `lifestyle_recommendations`, `dietary_advice`, \
`activity_guidance`, `symptom_relief` (each a list of short sentences), and `when_to_escalate` \
(when the patient must seek emergency care). Never prescribe medication doses.";

#[derive(Debug, Deserialize)]
struct Recommendations {
    #[serde(default)]
    immediate_actions: Vec<String>,
    #[serde(default)]
    lifestyle_recommendations: Vec<String>,
    #[serde(default)]
    dietary_advice: Vec<String>,
    #[serde(default)]
    activity_guidance: Vec<String>,
    #[serde(default)]
    symptom_relief: Vec<String>,
    #[serde(default)]
    when_to_escalate: String,
}

/// Produces the user-facing recommendations and escalation criteria.
pub struct RecommendationGenerator {
    generator: Arc<dyn ContentGenerator>,
}

impl RecommendationGenerator {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }

    async fn recommend(&self, record: &SharedStateRecord) -> Result<Recommendations, StageFault> {
        let derived = record.derived();
        let urgency = derived
            .urgency
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let prompt = StructuredPrompt::json(
            SYSTEM,
            format!(
                "Symptoms:\n{}\n\nPossible conditions:\n{}\n\nUrgency: {}\nRed flags:\n{}\n\nPatient:\n{}",
                bullet_list(&derived.extracted_items),
                bullet_list(&derived.findings),
                urgency,
                bullet_list(&derived.red_flags),
                patient_profile(derived)
            ),
        );
        let answer = self.generator.generate(&prompt).await?;
        parse_answer(self.id(), answer)
    }
}

#[async_trait]
impl Stage for RecommendationGenerator {
    fn id(&self) -> StageId {
        StageId::RecommendationGenerator
    }

    async fn execute(&self, record: &SharedStateRecord) -> Result<PartialUpdate, StageFault> {
        let recs = match self.recommend(record).await {
            Ok(recs) => recs,
            Err(fault) => {
                warn!(error = %fault, "recommendation generation failed; using fallback advice");
                return Ok(PartialUpdate {
                    derived: DerivedUpdate {
                        recommendations: Some(vec![FALLBACK_ADVICE.to_string()]),
                        ..DerivedUpdate::default()
                    },
                    ..PartialUpdate::default()
                }
                .with_error(self.id(), format!("recommendation generation failed: {fault}")));
            }
        };

        let recommendations: Vec<String> = recs
            .immediate_actions
            .into_iter()
            .chain(recs.lifestyle_recommendations)
            .chain(recs.symptom_relief)
            .collect();
        debug!(recommendations = recommendations.len(), "recommendations generated");

        let mut derived = DerivedUpdate {
            recommendations: Some(recommendations),
            ..DerivedUpdate::default()
        };
        if !recs.when_to_escalate.is_empty() {
            derived.escalation_criteria = Some(recs.when_to_escalate);
        }
        derived
            .extensions
            .insert("dietary_advice".to_string(), Value::from(recs.dietary_advice));
        derived
            .extensions
            .insert("activity_guidance".to_string(), Value::from(recs.activity_guidance));

        Ok(PartialUpdate {
            derived,
            ..PartialUpdate::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use pipeline::RunContext;
    use serde_json::json;

    use super::*;
    use crate::stages::testing::{offline, ScriptedGenerator};

    fn record() -> SharedStateRecord {
        SharedStateRecord::new("cough", RunContext::new())
    }

    #[tokio::test]
    async fn recommendations_are_assembled_in_order() {
        let generator = Arc::new(ScriptedGenerator::answering(vec![Ok(json!({
            "immediate_actions": ["rest"],
            "lifestyle_recommendations": ["sleep more"],
            "dietary_advice": ["warm fluids"],
            "activity_guidance": ["avoid exertion"],
            "symptom_relief": ["honey"],
            "when_to_escalate": "if breathing becomes difficult"
        }))]));
        let update = RecommendationGenerator::new(generator)
            .execute(&record())
            .await
            .unwrap();

        let derived = update.derived;
        assert_eq!(derived.recommendations.unwrap(), vec!["rest", "sleep more", "honey"]);
        assert_eq!(
            derived.escalation_criteria.as_deref(),
            Some("if breathing becomes difficult")
        );
        assert_eq!(derived.extensions["dietary_advice"], json!(["warm fluids"]));
    }

    #[tokio::test]
    async fn failure_falls_back_to_consulting_a_professional() {
        let generator = Arc::new(ScriptedGenerator::answering(vec![Err(offline())]));
        let update = RecommendationGenerator::new(generator)
            .execute(&record())
            .await
            .unwrap();

        assert_eq!(
            update.derived.recommendations,
            Some(vec![FALLBACK_ADVICE.to_string()])
        );
        assert_eq!(update.errors.len(), 1);
        assert!(update.errors[0].message.contains("offline"));
    }
}
