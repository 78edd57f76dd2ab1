//! Urgency classification shared by the content stages.

use pipeline::{RiskLevel, Urgency};

/// Phrases that mark an extracted item as an acute condition.
pub const EMERGENCY_KEYWORDS: [&str; 7] = [
    "chest pain",
    "difficulty breathing",
    "severe bleeding",
    "unconscious",
    "seizure",
    "stroke symptoms",
    "heart attack",
];

/// Returns `true` if `item` mentions any emergency keyword, case-insensitively.
pub fn is_acute(item: &str) -> bool {
    let item = item.to_lowercase();
    EMERGENCY_KEYWORDS.iter().any(|keyword| item.contains(keyword))
}

/// Urgency implied by the extracted items and their highest severity (1–10).
pub fn from_symptoms<S: AsRef<str>>(items: &[S], max_severity: u8) -> Urgency {
    if items.iter().any(|item| is_acute(item.as_ref())) {
        Urgency::Emergency
    } else if max_severity >= 8 {
        Urgency::High
    } else if max_severity >= 5 {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

/// Urgency implied by a risk assessment.
///
/// More than two red flags, a critical risk level, or an immediate-care flag
/// is an emergency; any red flag or a high risk level is high.
pub fn from_risk(risk: Option<RiskLevel>, requires_immediate_care: bool, red_flags: usize) -> Urgency {
    if requires_immediate_care || risk == Some(RiskLevel::Critical) || red_flags > 2 {
        Urgency::Emergency
    } else if risk == Some(RiskLevel::High) || red_flags > 0 {
        Urgency::High
    } else if risk == Some(RiskLevel::Moderate) {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}
