//! Agent catalogue and the outcome of a single remote agent invocation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schemas::AgentResponse;

/// The eight remote agent workflows the orchestrator knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentId {
    #[serde(rename = "agent1")]
    DoubtResolver,
    #[serde(rename = "agent2")]
    HintStrategy,
    #[serde(rename = "agent3")]
    HesitationDetector,
    #[serde(rename = "agent4")]
    StuckScore,
    #[serde(rename = "agent5")]
    MistakePattern,
    #[serde(rename = "agent6")]
    ProgressTracker,
    #[serde(rename = "agent7")]
    FlashcardRecommender,
    #[serde(rename = "agent8")]
    VideoIntelligence,
}

impl AgentId {
    pub const ALL: [AgentId; 8] = [
        AgentId::DoubtResolver,
        AgentId::HintStrategy,
        AgentId::HesitationDetector,
        AgentId::StuckScore,
        AgentId::MistakePattern,
        AgentId::ProgressTracker,
        AgentId::FlashcardRecommender,
        AgentId::VideoIntelligence,
    ];

    /// Wire identifier (`agent1` … `agent8`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoubtResolver => "agent1",
            Self::HintStrategy => "agent2",
            Self::HesitationDetector => "agent3",
            Self::StuckScore => "agent4",
            Self::MistakePattern => "agent5",
            Self::ProgressTracker => "agent6",
            Self::FlashcardRecommender => "agent7",
            Self::VideoIntelligence => "agent8",
        }
    }

    /// Human-readable agent name, used in logs and error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::DoubtResolver => "Direct Doubt Resolver",
            Self::HintStrategy => "Hint Strategy Agent",
            Self::HesitationDetector => "Hesitation Detector",
            Self::StuckScore => "Stuck Score Calculator",
            Self::MistakePattern => "Mistake Pattern Learner",
            Self::ProgressTracker => "Progress Tracker",
            Self::FlashcardRecommender => "Flashcard Recommender",
            Self::VideoIntelligence => "Video Intelligence Agent",
        }
    }

    /// Default webhook path, appended to the configured base URL.
    pub fn default_path(&self) -> &'static str {
        match self {
            Self::DoubtResolver => "/webhook/agent1/submit-doubt",
            Self::HintStrategy => "/webhook/agent2/get-hint",
            Self::HesitationDetector => "/webhook/agent3/hesitation",
            Self::StuckScore => "/webhook/agent4/stuck-score",
            Self::MistakePattern => "/webhook/agent5/mistake-pattern",
            Self::ProgressTracker => "/webhook/agent6/progress",
            Self::FlashcardRecommender => "/webhook/agent7/flashcards",
            Self::VideoIntelligence => "/webhook/agent8/video-intelligence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an agent call did not produce a usable payload.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentCallError {
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("connection failed: {message}")]
    Connect { message: String },

    #[error("HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("request failed: {message}")]
    Request { message: String },

    #[error("response violates schema: {message}")]
    Schema { message: String },

    #[error("cycle deadline of {deadline_ms}ms exceeded")]
    DeadlineExceeded { deadline_ms: u64 },

    #[error("cancelled before completion")]
    Cancelled,
}

impl AgentCallError {
    /// Transport faults are retried; schema problems are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Connect { .. } | Self::BadStatus { .. } | Self::Request { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connect { .. } => "connect",
            Self::BadStatus { .. } => "bad_status",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Request { .. } => "request",
            Self::Schema { .. } => "schema",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one gateway invocation, including every retry it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCallResult {
    pub agent: AgentId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AgentCallError>,
    pub latency_ms: u64,
    pub attempts: u32,
}

impl AgentCallResult {
    pub fn succeeded(agent: AgentId, payload: serde_json::Value, latency_ms: u64, attempts: u32) -> Self {
        Self {
            agent,
            success: true,
            payload: Some(payload),
            error: None,
            latency_ms,
            attempts,
        }
    }

    pub fn failed(agent: AgentId, error: AgentCallError, latency_ms: u64, attempts: u32) -> Self {
        Self {
            agent,
            success: false,
            payload: None,
            error: Some(error),
            latency_ms,
            attempts,
        }
    }

    /// Decode the payload against the agent's declared response schema.
    ///
    /// A payload that does not decode downgrades this result to a failure
    /// carrying [`AgentCallError::Schema`]; the raw payload is kept for audit.
    pub fn decode<T: AgentResponse>(&mut self) -> Result<T, AgentCallError> {
        if !self.success {
            return Err(self.error.clone().unwrap_or(AgentCallError::Request {
                message: "agent call failed without detail".into(),
            }));
        }

        let decoded = match &self.payload {
            Some(payload) => serde_json::from_value::<T>(payload.clone())
                .map_err(|e| e.to_string())
                .and_then(|value| value.validate().map(|()| value)),
            None => Err("empty payload".to_string()),
        };

        decoded.map_err(|message| {
            let err = AgentCallError::Schema {
                message: format!("{}: {message}", self.agent),
            };
            self.success = false;
            self.error = Some(err.clone());
            err
        })
    }
}
