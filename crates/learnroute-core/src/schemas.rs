//! Request/response contracts for each remote agent.
//!
//! Field names match the agents' declared JSON exactly; the gateway sends
//! these verbatim and performs no translation.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::types::Difficulty;

/// A request body bound to exactly one agent.
pub trait AgentRequest: Serialize {
    const AGENT: AgentId;
}

/// A decoded agent response. `validate` enforces value ranges serde cannot.
pub trait AgentResponse: DeserializeOwned {
    const AGENT: AgentId;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

fn unit_interval(field: &str, value: f64) -> Result<(), String> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{field} must be within [0, 1], got {value}"))
    }
}

// --- agent1: Direct Doubt Resolver ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoubtResolverRequest {
    pub user_id: String,
    pub question_id: String,
    pub student_answer: String,
    pub topic: String,
    pub difficulty: Difficulty,
}

impl AgentRequest for DoubtResolverRequest {
    const AGENT: AgentId = AgentId::DoubtResolver;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubtResolution {
    pub solution: String,
    #[serde(default)]
    pub explanation: String,
    pub confidence: f64,
}

impl AgentResponse for DoubtResolution {
    const AGENT: AgentId = AgentId::DoubtResolver;

    fn validate(&self) -> Result<(), String> {
        unit_interval("confidence", self.confidence)
    }
}

// --- agent2: Hint Strategy ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintStrategyRequest {
    pub user_id: String,
    pub question_id: String,
    pub current_hint_level: u8,
    pub student_answer: String,
    pub topic: String,
    pub difficulty: Difficulty,
}

impl AgentRequest for HintStrategyRequest {
    const AGENT: AgentId = AgentId::HintStrategy;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintSuggestion {
    pub hint: String,
    pub hint_level: u8,
    #[serde(default)]
    pub max_hints: Option<u8>,
    #[serde(default)]
    pub next_available: Option<bool>,
}

impl AgentResponse for HintSuggestion {
    const AGENT: AgentId = AgentId::HintStrategy;
}

// --- agent3: Hesitation Detector ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HesitationRequest {
    pub user_id: String,
    pub question_id: String,
    pub step_number: u32,
    pub student_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_taken: Option<u64>,
}

impl AgentRequest for HesitationRequest {
    const AGENT: AgentId = AgentId::HesitationDetector;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HesitationReport {
    pub hesitation_detected: bool,
    pub hesitation_score: f64,
    pub prolonged_hesitation: bool,
}

impl AgentResponse for HesitationReport {
    const AGENT: AgentId = AgentId::HesitationDetector;

    fn validate(&self) -> Result<(), String> {
        unit_interval("hesitation_score", self.hesitation_score)
    }
}

// --- agent4: Stuck Score Calculator ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckScoreRequest {
    pub user_id: String,
    pub question_id: String,
    pub step_number: u32,
    pub student_answer: String,
    pub hint_level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hesitation_score: Option<f64>,
}

impl AgentRequest for StuckScoreRequest {
    const AGENT: AgentId = AgentId::StuckScore;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StuckScoreReport {
    pub stuck_score: u8,
    pub stuck_level: String,
    pub needs_intervention: bool,
}

impl AgentResponse for StuckScoreReport {
    const AGENT: AgentId = AgentId::StuckScore;

    fn validate(&self) -> Result<(), String> {
        if self.stuck_score > 100 {
            return Err(format!("stuck_score must be within [0, 100], got {}", self.stuck_score));
        }
        Ok(())
    }
}

// --- agent5: Mistake Pattern Learner ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistakePatternRequest {
    pub user_id: String,
    pub question_id: String,
    pub student_answer: String,
    pub correct_answer: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mistake_history: Option<Vec<serde_json::Value>>,
}

impl AgentRequest for MistakePatternRequest {
    const AGENT: AgentId = AgentId::MistakePattern;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MistakePatternReport {
    pub mistake_pattern: String,
    pub pattern_strength: f64,
    pub repeated_mistake: bool,
    pub learning_gap: String,
}

impl AgentResponse for MistakePatternReport {
    const AGENT: AgentId = AgentId::MistakePattern;

    fn validate(&self) -> Result<(), String> {
        unit_interval("pattern_strength", self.pattern_strength)
    }
}

// --- agent6: Progress Tracker ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressTrackerRequest {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<u32>,
}

impl AgentRequest for ProgressTrackerRequest {
    const AGENT: AgentId = AgentId::ProgressTracker;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    #[serde(default)]
    pub progress_data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub mastery_levels: BTreeMap<String, f64>,
    #[serde(default)]
    pub learning_velocity: f64,
    #[serde(default)]
    pub time_spent: u64,
    #[serde(default)]
    pub questions_attempted: Option<u64>,
    #[serde(default)]
    pub recent_topics: Vec<String>,
    #[serde(default)]
    pub recent_activity: Vec<serde_json::Value>,
    #[serde(default)]
    pub improvement_rate: Option<f64>,
}

impl AgentResponse for ProgressReport {
    const AGENT: AgentId = AgentId::ProgressTracker;

    fn validate(&self) -> Result<(), String> {
        for (topic, level) in &self.mastery_levels {
            unit_interval(&format!("mastery_levels.{topic}"), *level)?;
        }
        Ok(())
    }
}

// --- agent7: Flashcard Recommender ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashcardRequest {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mistake_patterns: Option<Vec<String>>,
}

impl AgentRequest for FlashcardRequest {
    const AGENT: AgentId = AgentId::FlashcardRecommender;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardRecommendations {
    pub flashcards: Vec<serde_json::Value>,
    #[serde(default)]
    pub priority_topics: Vec<String>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub next_review: Option<String>,
}

impl AgentResponse for FlashcardRecommendations {
    const AGENT: AgentId = AgentId::FlashcardRecommender;
}

// --- agent8: Video Intelligence ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoIntelligenceRequest {
    pub user_id: String,
    pub question_id: String,
    pub topic: String,
    pub trigger_reason: String,
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl AgentRequest for VideoIntelligenceRequest {
    const AGENT: AgentId = AgentId::VideoIntelligence;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAssistance {
    pub action: String,
    #[serde(default)]
    pub video_ref: Option<String>,
    #[serde(default)]
    pub youtube_metadata: Option<serde_json::Value>,
    pub explanation: String,
}

impl AgentResponse for VideoAssistance {
    const AGENT: AgentId = AgentId::VideoIntelligence;
}
