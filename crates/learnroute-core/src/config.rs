//! Configuration loading and validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::LearnRouteError;
use crate::types::MAX_HINT_LEVEL;

/// Top-level learnroute configuration (`~/.learnroute/config.json`, JSON5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<AgentsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorder: Option<RecorderConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Where the remote agents live and how hard to try reaching them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-attempt timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default)]
    pub jitter: bool,

    /// Full URL overrides keyed by agent id (`"agent3": "http://..."`).
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
            endpoints: BTreeMap::new(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5678".into()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    8_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Stuck scores strictly above this escalate.
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: u8,

    #[serde(default = "default_max_hint_level")]
    pub max_hint_level: u8,

    /// Aggregate deadline for optional calls in one cycle.
    #[serde(default = "default_cycle_deadline_ms")]
    pub cycle_deadline_ms: u64,

    #[serde(default = "default_time_range_days")]
    pub default_time_range_days: u32,

    #[serde(default = "default_dashboard_time_range_days")]
    pub dashboard_time_range_days: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            stuck_threshold: default_stuck_threshold(),
            max_hint_level: default_max_hint_level(),
            cycle_deadline_ms: default_cycle_deadline_ms(),
            default_time_range_days: default_time_range_days(),
            dashboard_time_range_days: default_dashboard_time_range_days(),
        }
    }
}

fn default_stuck_threshold() -> u8 {
    70
}

fn default_max_hint_level() -> u8 {
    MAX_HINT_LEVEL
}

fn default_cycle_deadline_ms() -> u64 {
    45_000
}

fn default_time_range_days() -> u32 {
    7
}

fn default_dashboard_time_range_days() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    #[serde(default = "default_true")]
    pub cors_allow_any: bool,
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Directory for `interactions.jsonl` (default `~/.learnroute/records`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "learnroute_agents=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Substitute `${ENV_VAR}` patterns with their environment values (missing vars become empty).
fn substitute_env_vars(input: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };
    re.replace_all(input, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        json5::from_str(&substituted).map_err(|e| LearnRouteError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn agents(&self) -> AgentsConfig {
        self.agents.clone().unwrap_or_default()
    }

    pub fn routing(&self) -> RoutingConfig {
        self.routing.clone().unwrap_or_default()
    }

    /// Resolved URL for an agent: explicit override, else `base_url + path`.
    pub fn agent_url(&self, agent: AgentId) -> String {
        let agents = self.agents();
        if let Some(url) = agents.endpoints.get(agent.as_str()) {
            return url.clone();
        }
        format!("{}{}", agents.base_url.trim_end_matches('/'), agent.default_path())
    }

    pub fn server_port(&self) -> u16 {
        self.server.as_ref().map(|s| s.port).unwrap_or(8000)
    }

    pub fn server_bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn cors_allow_any(&self) -> bool {
        self.server.as_ref().map(|s| s.cors_allow_any).unwrap_or(true)
    }

    pub fn recorder_enabled(&self) -> bool {
        self.recorder.as_ref().map(|r| r.enabled).unwrap_or(true)
    }

    /// Directory holding the interaction log.
    pub fn recorder_dir(&self) -> PathBuf {
        self.recorder
            .as_ref()
            .and_then(|r| r.dir.as_ref())
            .map(|d| expand_home(d))
            .unwrap_or_else(|| data_dir().join("records"))
    }

    /// Get a config value by dotted path (e.g. "agents.timeout_ms").
    ///
    /// Sections that were never written resolve to their defaults so
    /// `config get` shows effective values.
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self.effective()).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Set a config value by dotted path.
    pub fn set_path(&mut self, path: &str, value: serde_json::Value) -> anyhow::Result<()> {
        let mut json = serde_json::to_value(&*self)
            .map_err(|e| anyhow::anyhow!("Config serialization error: {e}"))?;

        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(anyhow::anyhow!("Empty path"));
        };

        let mut current = &mut json;
        for segment in parents {
            if current.get(*segment).is_none() {
                current[*segment] = serde_json::json!({});
            }
            current = current
                .get_mut(*segment)
                .ok_or_else(|| anyhow::anyhow!("Cannot descend into '{segment}'"))?;
        }
        current[*last] = value;

        *self = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("Config deserialization error: {e}"))?;
        Ok(())
    }

    /// A copy with every section populated with its effective values.
    pub fn effective(&self) -> Config {
        Config {
            agents: Some(self.agents()),
            routing: Some(self.routing()),
            server: Some(ServerConfig {
                port: self.server_port(),
                bind: Some(self.server_bind()),
                cors_allow_any: self.cors_allow_any(),
            }),
            recorder: Some(RecorderConfig {
                dir: Some(self.recorder_dir().display().to_string()),
                enabled: self.recorder_enabled(),
            }),
            logging: Some(self.logging.clone().unwrap_or_else(|| LoggingConfig {
                format: default_log_format(),
                level: None,
                filters: Vec::new(),
                output: default_log_output(),
            })),
        }
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(agents) = &self.agents {
            if agents.max_attempts == 0 {
                errors.push("agents.max_attempts must be at least 1".to_string());
            }
            if agents.timeout_ms == 0 {
                errors.push("agents.timeout_ms cannot be 0".to_string());
            }
            if agents.base_delay_ms > agents.max_delay_ms {
                errors.push(format!(
                    "agents.base_delay_ms ({}) exceeds agents.max_delay_ms ({})",
                    agents.base_delay_ms, agents.max_delay_ms
                ));
            }
            match url::Url::parse(&agents.base_url) {
                Ok(u) if u.scheme() != "http" && u.scheme() != "https" => {
                    warnings.push(format!(
                        "agents.base_url uses unexpected scheme '{}'",
                        u.scheme()
                    ));
                }
                Ok(_) => {}
                Err(e) => errors.push(format!("agents.base_url is not a valid URL: {e}")),
            }
            for (agent, endpoint) in &agents.endpoints {
                if AgentId::parse(agent).is_none() {
                    warnings.push(format!("agents.endpoints.{agent} does not name a known agent"));
                }
                if let Err(e) = url::Url::parse(endpoint) {
                    errors.push(format!("agents.endpoints.{agent} is not a valid URL: {e}"));
                }
            }
        }

        if let Some(routing) = &self.routing {
            if routing.max_hint_level > MAX_HINT_LEVEL {
                warnings.push(format!(
                    "routing.max_hint_level {} is above {MAX_HINT_LEVEL} and will be clamped",
                    routing.max_hint_level
                ));
            }
            if routing.stuck_threshold > 100 {
                warnings.push("routing.stuck_threshold above 100 disables stuck escalation".to_string());
            }
        }

        if let Some(server) = &self.server {
            if server.port == 0 {
                errors.push("Server port cannot be 0".to_string());
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

/// Base directory for learnroute data: `~/.learnroute/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".learnroute")
}
