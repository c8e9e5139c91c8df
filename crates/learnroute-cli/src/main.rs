use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use learnroute_core::agent::AgentId;
use learnroute_core::config::Config;
use learnroute_core::protocol::ErrorBody;
use learnroute_core::record_store::JsonlInteractionStore;
use learnroute_core::recorder::{InteractionRecorder, MemoryRecorder};
use learnroute_core::types::InteractionEvent;
use learnroute_engine::RouteOptions;
use learnroute_server::state::{build_engine, recorder_from_config};
use learnroute_server::AppState;

#[derive(Parser)]
#[command(
    name = "learnroute",
    about = "Routes learner interactions across remote learning agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: 8000)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one routing cycle for a JSON interaction event and print the envelope
    Route {
        /// Event file, or "-" for stdin
        input: String,

        /// Keep the cycle record in memory instead of the interaction log
        #[arg(long)]
        no_record: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Inspect recorded interactions
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },

    /// Show effective settings
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Check the configuration for problems
    Validate,
}

#[derive(Subcommand)]
enum RecordsAction {
    /// Most recent cycles for a learner, newest first
    Recent {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Per-day and per-agent activity for a learner
    Summary {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

/// `RUST_LOG` wins, then `logging.level`, then info (debug with `--verbose`).
fn init_logging(config: &Config, verbose: bool) {
    let logging = config.logging.clone().unwrap_or_default();
    let mut directives = logging
        .level
        .clone()
        .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string());
    for filter in &logging.filters {
        directives.push(',');
        directives.push_str(filter);
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let to_stdout = logging.output == "stdout";

    match (logging.format == "json", to_stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).init(),
        (true, false) => builder.json().with_writer(std::io::stderr).init(),
        (false, true) => builder.with_writer(std::io::stdout).init(),
        (false, false) => builder.with_writer(std::io::stderr).init(),
    }
}

fn read_event(input: &str) -> anyhow::Result<InteractionEvent> {
    let raw = if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input)?
    };
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Serve { port, bind } => {
            let (warnings, errors) = config.validate();
            for w in &warnings {
                tracing::warn!("config: {w}");
            }
            if !errors.is_empty() {
                anyhow::bail!("invalid config: {}", errors.join("; "));
            }

            let port = port.unwrap_or_else(|| config.server_port());
            let bind = bind.unwrap_or_else(|| config.server_bind());
            let state = AppState::from_config(config);

            #[cfg(feature = "metrics")]
            let state = match learnroute_server::metrics::install_prometheus_recorder() {
                Ok(handle) => state.with_prometheus(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "Prometheus recorder unavailable");
                    state
                }
            };

            tracing::info!("Starting learnroute on {bind}:{port}");
            learnroute_server::start_server(Arc::new(state), &bind, port).await?;
        }
        Commands::Route { input, no_record } => {
            let event = read_event(&input)?;
            let recorder: Arc<dyn InteractionRecorder> = if no_record {
                Arc::new(MemoryRecorder::new())
            } else {
                recorder_from_config(&config)
            };
            let engine = build_engine(&config, recorder);

            let cancel = CancellationToken::new();
            let watcher = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                })
            };
            let options = RouteOptions {
                cancel,
                include_history: false,
            };
            let result = engine.route_with(event, options).await;
            watcher.abort();

            match result {
                Ok(envelope) => println!("{}", serde_json::to_string_pretty(&envelope)?),
                Err(e) => {
                    let body = ErrorBody::new(e.reason_code(), e.to_string());
                    println!("{}", serde_json::to_string_pretty(&body)?);
                    std::process::exit(1);
                }
            }
        }
        Commands::Status => {
            let settings = learnroute_engine::EngineSettings::from_config(&config);
            let agents = config.agents();
            println!("learnroute v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Server: {}:{}", config.server_bind(), config.server_port());
            println!(
                "Agents: {} attempts, {}ms timeout, backoff {}..{}ms{}",
                agents.max_attempts,
                agents.timeout_ms,
                agents.base_delay_ms,
                agents.max_delay_ms,
                if agents.jitter { " with jitter" } else { "" }
            );
            for agent in AgentId::ALL {
                println!("  {agent} {:<26} {}", agent.display_name(), config.agent_url(agent));
            }
            println!(
                "Routing: stuck > {}, hint ladder {}, cycle deadline {}ms",
                settings.stuck_threshold,
                settings.max_hint_level,
                settings.cycle_deadline.as_millis()
            );
            if config.recorder_enabled() {
                println!("Records: {}", config.recorder_dir().display());
            } else {
                println!("Records: disabled");
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config.effective())?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("no config value at {key}"),
            },
            ConfigAction::Set { key, value } => {
                let value = serde_json::from_str(&value)
                    .unwrap_or(serde_json::Value::String(value));
                let mut config = config;
                config.set_path(&key, value)?;
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                config.save(&config_path)?;
                println!("Updated {key} in {}", config_path.display());
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} config error(s)", errors.len());
                }
                println!("Config OK");
            }
        },
        Commands::Records { action } => {
            let store = JsonlInteractionStore::new(config.recorder_dir());
            match action {
                RecordsAction::Recent { user, limit } => {
                    let records = store.recent(&user, limit).await?;
                    if records.is_empty() {
                        println!("No records for {user}");
                    }
                    for record in records {
                        let agents: Vec<&str> = record.calls.iter().map(|c| c.agent.as_str()).collect();
                        println!(
                            "{}  {}  {:<15} {:<9} {}",
                            record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                            record.cycle_id,
                            record.event.intent.as_str(),
                            record.outcome.label(),
                            agents.join(",")
                        );
                    }
                }
                RecordsAction::Summary { user, days } => {
                    let summary = store.activity_summary(&user, days).await?;
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
            }
        }
    }

    Ok(())
}
