use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;

/// Highest hint level; reaching it forces an escalation check.
pub const MAX_HINT_LEVEL: u8 = 4;

/// What the learner asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionIntent {
    DirectSolution,
    Guided,
    Video,
    ProgressQuery,
}

impl InteractionIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectSolution => "direct_solution",
            Self::Guided => "guided",
            Self::Video => "video",
            Self::ProgressQuery => "progress_query",
        }
    }
}

impl std::fmt::Display for InteractionIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

fn default_step_number() -> u32 {
    1
}

/// One learning interaction as received from a client. Immutable once routed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub user_id: String,

    #[serde(default)]
    pub question_id: String,

    #[serde(default = "default_step_number")]
    pub step_number: u32,

    #[serde(default)]
    pub student_answer: String,

    pub intent: InteractionIntent,

    #[serde(default)]
    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_level: Option<u8>,

    /// Seconds the learner spent on the current step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_taken: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_context: Option<String>,

    /// Enables the mistake-pattern agent when it differs from the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mistake_history: Option<Vec<serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range_days: Option<u32>,

    #[serde(default)]
    pub include_flashcards: bool,
}

impl InteractionEvent {
    /// A bare event for `user_id` with the given intent; every optional field absent.
    pub fn new(user_id: impl Into<String>, intent: InteractionIntent) -> Self {
        Self {
            user_id: user_id.into(),
            question_id: String::new(),
            step_number: 1,
            student_answer: String::new(),
            intent,
            topic: String::new(),
            difficulty: None,
            hint_level: None,
            time_taken: None,
            timestamp: None,
            video_context: None,
            correct_answer: None,
            mistake_history: None,
            time_range_days: None,
            include_flashcards: false,
        }
    }

    /// Inbound hint level clamped to [0, 4], if one was sent.
    pub fn clamped_hint_level(&self) -> Option<u8> {
        self.hint_level.map(|l| l.min(MAX_HINT_LEVEL))
    }

    /// Topic as a filter; empty means "all topics".
    pub fn topic_filter(&self) -> Option<&str> {
        let topic = self.topic.trim();
        (!topic.is_empty()).then_some(topic)
    }

    /// True when a correct answer was supplied and differs from the learner's,
    /// compared trimmed and case-insensitively.
    pub fn answer_differs(&self) -> bool {
        match &self.correct_answer {
            Some(correct) if !correct.trim().is_empty() => {
                correct.trim().to_lowercase() != self.student_answer.trim().to_lowercase()
            }
            _ => false,
        }
    }

    /// Check that the fields the intent needs are present.
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("user_id is required".into());
        }
        match self.intent {
            InteractionIntent::DirectSolution | InteractionIntent::Guided => {
                if self.question_id.trim().is_empty() {
                    return Err(format!("question_id is required for {}", self.intent));
                }
                if self.topic.trim().is_empty() {
                    return Err(format!("topic is required for {}", self.intent));
                }
                if self.difficulty.is_none() {
                    return Err(format!("difficulty is required for {}", self.intent));
                }
            }
            InteractionIntent::Video => {
                if self.question_id.trim().is_empty() {
                    return Err("question_id is required for video".into());
                }
            }
            InteractionIntent::ProgressQuery => {}
        }
        if self.step_number == 0 {
            return Err("step_number must be at least 1".into());
        }
        Ok(())
    }
}

/// Presentation mode of a response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseMode {
    Hint,
    Solution,
    Video,
    Flashcard,
    Progress,
}

/// Why the video agent was pulled into a guided cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    HintExhausted,
    ProlongedHesitation,
    HighStuckScore,
    RepeatedMistakePattern,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HintExhausted => "hint_exhausted",
            Self::ProlongedHesitation => "prolonged_hesitation",
            Self::HighStuckScore => "high_stuck_score",
            Self::RepeatedMistakePattern => "repeated_mistake_pattern",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    /// Agent whose output forms the envelope content.
    pub agent: AgentId,
    /// Wall-clock milliseconds for the whole cycle.
    pub response_time: u64,
    pub cycle_id: String,
    pub agents_invoked: Vec<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_reason: Option<EscalationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// The single response shape every endpoint returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub mode: ResponseMode,
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_level: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stuck_score: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hint_available: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_metadata: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<ActivitySummary>,

    pub analytics: Analytics,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressOverview {
    pub total_time_spent: u64,
    pub learning_velocity: f64,
    pub mastery_average: f64,
    #[serde(default)]
    pub questions_attempted: u64,
}

/// Learner progress digest built from the progress and flashcard agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub overview: ProgressOverview,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub mastery_levels: BTreeMap<String, f64>,
    #[serde(default)]
    pub flashcards: Vec<serde_json::Value>,
    #[serde(default)]
    pub recent_topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub total: u64,
    /// Cycle counts keyed by intent wire name.
    pub by_intent: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUsage {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub avg_latency_ms: f64,
}

/// Recorder-derived history for one learner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub period_days: u32,
    pub total_cycles: u64,
    pub daily: Vec<DailyActivity>,
    pub agents: BTreeMap<AgentId, AgentUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn guided() -> InteractionEvent {
        InteractionEvent {
            question_id: "q1".into(),
            topic: "Arrays".into(),
            difficulty: Some(Difficulty::Medium),
            student_answer: "loop twice".into(),
            ..InteractionEvent::new("u1", InteractionIntent::Guided)
        }
    }

    #[test]
    fn test_event_deserialize_with_defaults() {
        let event: InteractionEvent = serde_json::from_value(json!({
            "user_id": "u1",
            "question_id": "q9",
            "intent": "direct_solution",
            "topic": "Graphs",
            "difficulty": "hard"
        }))
        .unwrap();
        assert_eq!(event.step_number, 1);
        assert_eq!(event.difficulty, Some(Difficulty::Hard));
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_unknown_intent_rejected() {
        let parsed = serde_json::from_value::<InteractionEvent>(json!({
            "user_id": "u1",
            "intent": "teleport"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_requires_fields_per_intent() {
        let mut event = guided();
        event.difficulty = None;
        assert!(event.validate().unwrap_err().contains("difficulty"));

        let progress = InteractionEvent::new("u1", InteractionIntent::ProgressQuery);
        assert!(progress.validate().is_ok());

        let anonymous = InteractionEvent::new(" ", InteractionIntent::ProgressQuery);
        assert!(anonymous.validate().is_err());
    }

    #[test]
    fn test_hint_level_clamped() {
        let mut event = guided();
        event.hint_level = Some(9);
        assert_eq!(event.clamped_hint_level(), Some(4));
        event.hint_level = None;
        assert_eq!(event.clamped_hint_level(), None);
    }

    #[test]
    fn test_answer_differs_ignores_case_and_whitespace() {
        let mut event = guided();
        event.student_answer = "  O(N) ".into();
        event.correct_answer = Some("o(n)".into());
        assert!(!event.answer_differs());
        event.correct_answer = Some("O(log n)".into());
        assert!(event.answer_differs());
        event.correct_answer = None;
        assert!(!event.answer_differs());
    }

    #[test]
    fn test_envelope_omits_absent_fields() {
        let envelope = ResponseEnvelope {
            mode: ResponseMode::Solution,
            content: "Use a hash map".into(),
            hint_level: None,
            stuck_score: None,
            video_ref: None,
            confidence_score: Some(0.9),
            next_hint_available: None,
            youtube_metadata: None,
            action: None,
            progress: None,
            history: None,
            analytics: Analytics {
                agent: AgentId::DoubtResolver,
                response_time: 12,
                cycle_id: "c1".into(),
                agents_invoked: vec![AgentId::DoubtResolver],
                trigger_reason: None,
                confidence: Some(0.9),
            },
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["mode"], "SOLUTION");
        assert_eq!(value["analytics"]["agent"], "agent1");
        assert!(value.get("hint_level").is_none());
        assert!(value.get("video_ref").is_none());
    }

    #[test]
    fn test_activity_summary_agent_keys() {
        let mut summary = ActivitySummary::default();
        summary.agents.insert(AgentId::StuckScore, AgentUsage::default());
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value["agents"].get("agent4").is_some());
    }
}
