//! Remote agent gateway.
//!
//! Each remote agent is an opaque HTTP function with a declared JSON
//! contract. The [`AgentGateway`] trait is the single seam the decision
//! engine calls through; [`http::HttpAgentGateway`] is the production
//! implementation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use learnroute_core::agent::{AgentCallError, AgentCallResult, AgentId};
use learnroute_core::config::Config;
use learnroute_core::schemas::AgentRequest;

pub mod http;
pub mod retry;

pub use http::HttpAgentGateway;
pub use retry::{Backoff, RetryPolicy};

/// One outbound call to one named agent.
///
/// Implementations never panic and never return an error: every failure
/// is folded into the returned [`AgentCallResult`]. Delivery is
/// at-least-once: agents are assumed safe to retry.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    async fn invoke(&self, agent: AgentId, payload: serde_json::Value) -> AgentCallResult;
}

/// Serialize a typed request and invoke the agent it is bound to.
pub async fn call<R>(gateway: &dyn AgentGateway, request: &R) -> AgentCallResult
where
    R: AgentRequest + Sync,
{
    match serde_json::to_value(request) {
        Ok(payload) => gateway.invoke(R::AGENT, payload).await,
        Err(e) => AgentCallResult::failed(
            R::AGENT,
            AgentCallError::Request {
                message: format!("could not encode request: {e}"),
            },
            0,
            0,
        ),
    }
}

/// Immutable gateway settings resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub endpoints: BTreeMap<AgentId, String>,
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl GatewaySettings {
    pub fn from_config(config: &Config) -> Self {
        let agents = config.agents();
        Self {
            endpoints: AgentId::ALL
                .into_iter()
                .map(|agent| (agent, config.agent_url(agent)))
                .collect(),
            timeout: Duration::from_millis(agents.timeout_ms),
            retry: RetryPolicy {
                max_attempts: agents.max_attempts,
                base_delay: Duration::from_millis(agents.base_delay_ms),
                max_delay: Duration::from_millis(agents.max_delay_ms),
                jitter: agents.jitter,
            },
        }
    }

    /// Settings pointing every agent at `base_url` with default paths.
    pub fn with_base_url(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            endpoints: AgentId::ALL
                .into_iter()
                .map(|agent| (agent, format!("{base}{}", agent.default_path())))
                .collect(),
            timeout,
            retry,
        }
    }

    pub fn url(&self, agent: AgentId) -> Option<&str> {
        self.endpoints.get(&agent).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learnroute_core::schemas::DoubtResolverRequest;
    use learnroute_core::types::Difficulty;
    use std::sync::Mutex;

    struct CapturingGateway {
        seen: Mutex<Vec<(AgentId, serde_json::Value)>>,
    }

    #[async_trait]
    impl AgentGateway for CapturingGateway {
        async fn invoke(&self, agent: AgentId, payload: serde_json::Value) -> AgentCallResult {
            self.seen.lock().unwrap().push((agent, payload.clone()));
            AgentCallResult::succeeded(agent, payload, 1, 1)
        }
    }

    #[tokio::test]
    async fn test_call_routes_to_bound_agent() {
        let gateway = CapturingGateway {
            seen: Mutex::new(Vec::new()),
        };
        let request = DoubtResolverRequest {
            user_id: "u1".into(),
            question_id: "q1".into(),
            student_answer: "n^2".into(),
            topic: "Sorting".into(),
            difficulty: Difficulty::Easy,
        };
        let result = call(&gateway, &request).await;
        assert!(result.success);

        let seen = gateway.seen.lock().unwrap();
        assert_eq!(seen[0].0, AgentId::DoubtResolver);
        assert_eq!(seen[0].1["difficulty"], "easy");
    }

    #[test]
    fn test_settings_from_config() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "agents": {
                "base_url": "http://agents:9000",
                "timeout_ms": 500,
                "max_attempts": 4,
                "endpoints": {"agent8": "http://video:1/hook"}
            }
        }))
        .unwrap();
        let settings = GatewaySettings::from_config(&config);
        assert_eq!(settings.timeout, Duration::from_millis(500));
        assert_eq!(settings.retry.max_attempts, 4);
        assert_eq!(
            settings.url(AgentId::HintStrategy),
            Some("http://agents:9000/webhook/agent2/get-hint")
        );
        assert_eq!(settings.url(AgentId::VideoIntelligence), Some("http://video:1/hook"));
    }
}
