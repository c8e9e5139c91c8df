//! Shared server state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use learnroute_agents::{GatewaySettings, HttpAgentGateway};
use learnroute_core::config::Config;
use learnroute_core::record_store::JsonlInteractionStore;
use learnroute_core::recorder::{InteractionRecorder, NullRecorder};
use learnroute_engine::{DecisionEngine, EngineSettings};

/// State shared by every request handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<DecisionEngine>,
    pub started_at: DateTime<Utc>,
    #[cfg(feature = "metrics")]
    pub prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Arc<Config>, engine: Arc<DecisionEngine>) -> Self {
        Self {
            config,
            engine,
            started_at: Utc::now(),
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    /// Wire the HTTP gateway and the configured recorder into a fresh engine.
    pub fn from_config(config: Config) -> Self {
        let recorder = recorder_from_config(&config);
        let engine = Arc::new(build_engine(&config, recorder));
        Self::new(Arc::new(config), engine)
    }

    #[cfg(feature = "metrics")]
    pub fn with_prometheus(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// The JSONL store under `recorder.dir`, or a recorder that drops everything
/// when recording is disabled.
pub fn recorder_from_config(config: &Config) -> Arc<dyn InteractionRecorder> {
    if config.recorder_enabled() {
        let dir = config.recorder_dir();
        info!(dir = %dir.display(), "Recording interactions");
        Arc::new(JsonlInteractionStore::new(dir))
    } else {
        info!("Interaction recording disabled");
        Arc::new(NullRecorder)
    }
}

pub fn build_engine(config: &Config, recorder: Arc<dyn InteractionRecorder>) -> DecisionEngine {
    let gateway = Arc::new(HttpAgentGateway::new(GatewaySettings::from_config(config)));
    DecisionEngine::new(gateway, recorder, EngineSettings::from_config(config))
}
