//! Agent routing decision engine.
//!
//! One [`DecisionEngine::route`] call is one cycle: the event's intent picks
//! the agents to call, signal agents fold into a [`signals::SignalSet`], the
//! escalation rules may pull in the video agent, the merger builds exactly
//! one [`ResponseEnvelope`](learnroute_core::types::ResponseEnvelope), and
//! the cycle is handed to the recorder.

use std::time::Duration;

use thiserror::Error;

use learnroute_core::agent::{AgentCallError, AgentId};
use learnroute_core::config::Config;
use learnroute_core::types::MAX_HINT_LEVEL;

pub mod cycle;
pub mod engine;
pub mod escalation;
pub mod merge;
pub mod progress;
pub mod signals;

pub use engine::{DecisionEngine, RouteOptions};

/// Failures that reach the caller.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("{} failed: {cause}", .agent.display_name())]
    RequiredAgentFailure { agent: AgentId, cause: AgentCallError },

    #[error("routing cycle cancelled")]
    Cancelled,
}

impl RouteError {
    /// Machine-readable reason, e.g. `agent1_timeout`.
    pub fn reason_code(&self) -> String {
        match self {
            Self::MalformedEvent(_) => "malformed_event".to_string(),
            Self::RequiredAgentFailure { agent, cause } => format!("{agent}_{}", cause.kind()),
            Self::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Immutable routing settings resolved from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub stuck_threshold: u8,
    /// Clamped to the terminal hint level.
    pub max_hint_level: u8,
    pub cycle_deadline: Duration,
    pub default_time_range_days: u32,
    pub dashboard_time_range_days: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        let routing = config.routing();
        Self {
            stuck_threshold: routing.stuck_threshold,
            max_hint_level: routing.max_hint_level.min(MAX_HINT_LEVEL),
            cycle_deadline: Duration::from_millis(routing.cycle_deadline_ms),
            default_time_range_days: routing.default_time_range_days,
            dashboard_time_range_days: routing.dashboard_time_range_days,
        }
    }

    pub fn thresholds(&self) -> escalation::Thresholds {
        escalation::Thresholds {
            max_hint_level: self.max_hint_level,
            stuck_threshold: self.stuck_threshold,
        }
    }
}
