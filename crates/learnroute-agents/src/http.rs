//! HTTP agent gateway: JSON POST per attempt, bounded timeout, retry with backoff.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use learnroute_core::agent::{AgentCallError, AgentCallResult, AgentId};

use crate::{AgentGateway, GatewaySettings};

/// Longest slice of a non-2xx body kept in the error.
const MAX_ERROR_BODY: usize = 512;

pub struct HttpAgentGateway {
    client: reqwest::Client,
    settings: GatewaySettings,
}

impl HttpAgentGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    async fn attempt(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, AgentCallError> {
        let response = self
            .client
            .post(url)
            .timeout(self.settings.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentCallError::BadStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice(&bytes).map_err(|e| AgentCallError::MalformedResponse {
            message: e.to_string(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> AgentCallError {
        if err.is_timeout() {
            AgentCallError::Timeout {
                timeout_ms: millis(self.settings.timeout),
            }
        } else if err.is_connect() {
            AgentCallError::Connect {
                message: err.to_string(),
            }
        } else {
            AgentCallError::Request {
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl AgentGateway for HttpAgentGateway {
    async fn invoke(&self, agent: AgentId, payload: serde_json::Value) -> AgentCallResult {
        let started = Instant::now();
        let Some(url) = self.settings.url(agent) else {
            return AgentCallResult::failed(
                agent,
                AgentCallError::Request {
                    message: format!("no endpoint configured for {agent}"),
                },
                0,
                0,
            );
        };

        let max_attempts = self.settings.retry.attempts();
        let mut backoff = self.settings.retry.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_started = Instant::now();
            let outcome = self.attempt(url, &payload).await;
            let elapsed = attempt_started.elapsed();

            let label = match &outcome {
                Ok(_) => "success",
                Err(e) => e.kind(),
            };
            metrics::histogram!(
                "agent_call_attempt_seconds",
                "agent" => agent.as_str(),
                "outcome" => label
            )
            .record(elapsed.as_secs_f64());
            debug!(
                agent = %agent,
                attempt,
                outcome = label,
                latency_ms = millis(elapsed),
                "Agent call attempt finished"
            );

            match outcome {
                Ok(value) => {
                    return AgentCallResult::succeeded(agent, value, millis(started.elapsed()), attempt);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = backoff.next_delay();
                    warn!(
                        agent = %agent,
                        attempt,
                        max_attempts,
                        delay_ms = millis(delay),
                        error = %err,
                        "Agent call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(
                        agent = %agent,
                        attempts = attempt,
                        error = %err,
                        "Agent call failed"
                    );
                    return AgentCallResult::failed(agent, err, millis(started.elapsed()), attempt);
                }
            }
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
