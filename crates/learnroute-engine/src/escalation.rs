//! Auto-escalation to the video agent after a guided cycle.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use learnroute_core::schemas::VideoAssistance;
use learnroute_core::types::{EscalationReason, InteractionEvent};

use crate::signals::SignalSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub max_hint_level: u8,
    /// Stuck scores strictly above this escalate.
    pub stuck_threshold: u8,
}

/// An escalation that fired, and what the video agent produced for it (if anything).
#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    pub reason: EscalationReason,
    pub video: Option<VideoAssistance>,
}

/// First matching escalation rule, in priority order. Absent signals never trigger.
pub fn check(signals: &SignalSet, thresholds: &Thresholds) -> Option<EscalationReason> {
    if signals
        .hint_level
        .is_some_and(|level| level >= thresholds.max_hint_level)
    {
        return Some(EscalationReason::HintExhausted);
    }
    if signals.prolonged_hesitation == Some(true) {
        return Some(EscalationReason::ProlongedHesitation);
    }
    if signals
        .stuck_score
        .is_some_and(|score| score > thresholds.stuck_threshold)
    {
        return Some(EscalationReason::HighStuckScore);
    }
    if signals.repeated_mistake == Some(true) {
        return Some(EscalationReason::RepeatedMistakePattern);
    }
    None
}

/// Context object sent to the video agent on escalation.
pub fn context(signals: &SignalSet, event: &InteractionEvent) -> Map<String, Value> {
    let mut ctx = Map::new();
    if let Some(level) = signals.hint_level {
        ctx.insert("hint_level".into(), json!(level));
    }
    if let Some(score) = signals.stuck_score {
        ctx.insert("stuck_score".into(), json!(score));
    }
    if let Some(flag) = signals.hesitation_detected {
        ctx.insert("hesitation_detected".into(), json!(flag));
    }
    if let Some(flag) = signals.prolonged_hesitation {
        ctx.insert("prolonged_hesitation".into(), json!(flag));
    }
    if let Some(flag) = signals.repeated_mistake {
        ctx.insert("repeated_mistake".into(), json!(flag));
    }
    ctx.insert("step_number".into(), json!(event.step_number));
    ctx
}

/// Context object for a learner-requested video.
pub fn user_request_context(event: &InteractionEvent, now: DateTime<Utc>) -> Map<String, Value> {
    let mut ctx = Map::new();
    if let Some(video_context) = &event.video_context {
        ctx.insert("video_context".into(), json!(video_context));
    }
    ctx.insert(
        "timestamp".into(),
        json!(event.timestamp.unwrap_or(now).to_rfc3339()),
    );
    ctx
}
