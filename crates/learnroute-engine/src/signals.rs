//! Per-cycle signal aggregation.

use serde::Serialize;

use learnroute_core::schemas::{HesitationReport, HintSuggestion, MistakePatternReport, StuckScoreReport};
use learnroute_core::types::MAX_HINT_LEVEL;

/// Everything the signal agents told us during one guided cycle.
///
/// Every field starts absent; a failed or skipped agent leaves its fields
/// absent rather than defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hesitation_detected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hesitation_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prolonged_hesitation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stuck_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stuck_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_intervention: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeated_mistake: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mistake_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hints: Option<u8>,
}

impl SignalSet {
    /// Fold the hint agent's answer. The level never moves below what the
    /// caller already reached and never above the terminal level.
    pub fn apply_hint(&mut self, hint: &HintSuggestion, inbound: Option<u8>) {
        let level = inbound.unwrap_or(0).max(hint.hint_level).min(MAX_HINT_LEVEL);
        self.hint_level = Some(level);
        self.max_hints = hint.max_hints;
    }

    pub fn apply_hesitation(&mut self, report: &HesitationReport) {
        self.hesitation_detected = Some(report.hesitation_detected);
        self.hesitation_score = Some(report.hesitation_score);
        self.prolonged_hesitation = Some(report.prolonged_hesitation);
    }

    pub fn apply_stuck(&mut self, report: &StuckScoreReport) {
        self.stuck_score = Some(report.stuck_score);
        self.stuck_level = Some(report.stuck_level.clone());
        self.needs_intervention = Some(report.needs_intervention);
    }

    pub fn apply_mistake(&mut self, report: &MistakePatternReport) {
        self.repeated_mistake = Some(report.repeated_mistake);
        self.mistake_pattern = Some(report.mistake_pattern.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(level: u8) -> HintSuggestion {
        HintSuggestion {
            hint: "Consider the base case".into(),
            hint_level: level,
            max_hints: Some(4),
            next_available: None,
        }
    }

    #[test]
    fn test_default_is_all_absent() {
        let signals = SignalSet::default();
        assert_eq!(serde_json::to_value(&signals).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_hint_level_is_monotonic_and_clamped() {
        let mut signals = SignalSet::default();
        signals.apply_hint(&hint(1), Some(3));
        assert_eq!(signals.hint_level, Some(3));

        signals.apply_hint(&hint(2), None);
        assert_eq!(signals.hint_level, Some(2));

        signals.apply_hint(&hint(7), Some(1));
        assert_eq!(signals.hint_level, Some(4));
    }

    #[test]
    fn test_apply_reports() {
        let mut signals = SignalSet::default();
        signals.apply_stuck(&StuckScoreReport {
            stuck_score: 85,
            stuck_level: "high".into(),
            needs_intervention: true,
        });
        signals.apply_mistake(&MistakePatternReport {
            mistake_pattern: "off_by_one".into(),
            pattern_strength: 0.7,
            repeated_mistake: true,
            learning_gap: "loop bounds".into(),
        });
        assert_eq!(signals.stuck_score, Some(85));
        assert_eq!(signals.repeated_mistake, Some(true));
        assert!(signals.hesitation_detected.is_none());
    }
}
