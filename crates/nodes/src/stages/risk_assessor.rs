use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, DerivedUpdate, PartialUpdate, RiskLevel, SharedStateRecord, Stage,
    StageFault, StageId, StructuredPrompt, Urgency,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{bullet_list, parse_answer, patient_profile};
use crate::urgency;

/// Care window recorded when the assessment itself could not be produced.
pub const FALLBACK_CARE_WINDOW: &str =
    "Unable to assess risk. Please consult a healthcare professional as soon as possible.";

const SYSTEM: &str = "You assess the risk of a triage case. Answer with a JSON object with the \
keys `overall_risk_level` (one of low, moderate, high, critical), `risk_factors` (list), \
`urgency_recommendation` (when the patient should seek care), `red_flags` (warning signs that \
need immediate attention), and `monitoring_advice` (what to watch for).";

#[derive(Debug, Deserialize)]
struct Assessment {
    overall_risk_level: String,
    #[serde(default)]
    risk_factors: Vec<String>,
    #[serde(default)]
    urgency_recommendation: String,
    #[serde(default)]
    red_flags: Vec<String>,
    #[serde(default)]
    monitoring_advice: String,
}

/// Classifies overall risk and settles the final urgency.
///
/// The urgency it records is never lower than the one already on the record.
pub struct RiskAssessor {
    generator: Arc<dyn ContentGenerator>,
}

impl RiskAssessor {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }

    async fn assess(&self, record: &SharedStateRecord) -> Result<Assessment, StageFault> {
        let derived = record.derived();
        let prompt = StructuredPrompt::json(
            SYSTEM,
            format!(
                "Symptoms:\n{}\n\nPossible conditions:\n{}\n\nAnalysis: {}\n\nPatient:\n{}",
                bullet_list(&derived.extracted_items),
                bullet_list(&derived.findings),
                derived.analysis.as_deref().unwrap_or("none"),
                patient_profile(derived)
            ),
        );
        let answer = self.generator.generate(&prompt).await?;
        parse_answer(self.id(), answer)
    }
}

#[async_trait]
impl Stage for RiskAssessor {
    fn id(&self) -> StageId {
        StageId::RiskAssessor
    }

    async fn execute(&self, record: &SharedStateRecord) -> Result<PartialUpdate, StageFault> {
        let upstream = record.derived().urgency.unwrap_or(Urgency::Low);

        let assessment = match self.assess(record).await {
            Ok(assessment) => assessment,
            Err(fault) => {
                warn!(error = %fault, "risk assessment failed; assuming high urgency");
                return Ok(PartialUpdate {
                    derived: DerivedUpdate {
                        urgency: Some(upstream.max(Urgency::High)),
                        when_to_seek_care: Some(FALLBACK_CARE_WINDOW.to_string()),
                        ..DerivedUpdate::default()
                    },
                    ..PartialUpdate::default()
                }
                .with_error(self.id(), format!("risk assessment failed: {fault}")));
            }
        };

        let risk = RiskLevel::parse_label(&assessment.overall_risk_level);
        let assessed = urgency::from_risk(
            risk,
            record.derived().requires_immediate_care,
            assessment.red_flags.len(),
        );
        let final_urgency = assessed.max(upstream);

        debug!(
            risk = ?risk,
            red_flags = assessment.red_flags.len(),
            urgency = %final_urgency,
            "risk assessed"
        );

        let mut derived = DerivedUpdate {
            risk_level: risk,
            red_flags: Some(assessment.red_flags),
            urgency: Some(final_urgency),
            ..DerivedUpdate::default()
        };
        if !assessment.urgency_recommendation.is_empty() {
            derived.when_to_seek_care = Some(assessment.urgency_recommendation);
        }
        derived.extensions.insert(
            "risk_factors".to_string(),
            Value::from(assessment.risk_factors),
        );
        if !assessment.monitoring_advice.is_empty() {
            derived.extensions.insert(
                "monitoring_advice".to_string(),
                Value::String(assessment.monitoring_advice),
            );
        }

        Ok(PartialUpdate {
            derived,
            ..PartialUpdate::default()
        })
    }
}
