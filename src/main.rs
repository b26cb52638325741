//! ws-relay - Entry Point
//!
//! CLI for running a relay against a live endpoint, with events
//! republished to the tracing subscriber.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};

use ws_relay::{
    EventBus, LoggingConfig, RelayConfig, SocketEvent, SocketRelay, Store, TransportSecurity,
    VERSION,
};

/// ws-relay - WebSocket connection manager with retry and event fan-out
#[derive(Parser)]
#[command(name = "ws-relay")]
#[command(version = VERSION)]
#[command(about = "WebSocket connection-lifecycle manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay until interrupted
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "relay-config.toml")]
        config: PathBuf,
        /// Treat the embedding context as secure (`//host` -> `wss://`)
        #[arg(long)]
        secure: bool,
    },
    /// Open one connection and report whether the endpoint answers
    TestConnection {
        /// Path to configuration file
        #[arg(short, long, default_value = "relay-config.toml")]
        config: PathBuf,
    },
}

/// On-disk configuration: relay settings plus logging
#[derive(Debug, Deserialize)]
struct CliConfig {
    relay: RelayConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl CliConfig {
    fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: CliConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse config file")?;
        config.relay.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, secure } => run_relay(config, secure).await,
        Commands::TestConnection { config } => test_connection(config).await,
    }
}

async fn run_relay(config_path: PathBuf, secure: bool) -> Result<()> {
    let config = CliConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        endpoint = %config.relay.endpoint,
        reconnection = config.relay.reconnection,
        "Starting ws-relay"
    );

    let security = if secure {
        TransportSecurity::Secure
    } else {
        TransportSecurity::Insecure
    };

    let relay = SocketRelay::builder(config.relay)
        .security(security)
        .store(Arc::new(LogStore))
        .connect();

    shutdown_signal().await;
    info!("Shutdown signal received");
    relay.close();
    // Let the close frame flush before the runtime tears down
    tokio::time::sleep(Duration::from_millis(100)).await;

    info!("Relay stopped");
    Ok(())
}

async fn test_connection(config_path: PathBuf) -> Result<()> {
    let mut config = CliConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!(endpoint = %config.relay.endpoint, "Testing connection");

    // One shot: no retries for a probe
    config.relay.reconnection = false;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _relay = SocketRelay::builder(config.relay)
        .bus(Arc::new(ProbeBus { tx }))
        .connect();

    let verdict = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some((name, event)) = rx.recv().await {
            match name.as_str() {
                "open" => return Ok(()),
                "error" | "close" => {
                    anyhow::bail!("connection failed: {:?}", event)
                }
                _ => {}
            }
        }
        anyhow::bail!("connection probe ended without a verdict")
    })
    .await
    .context("connection probe timed out")?;

    match verdict {
        Ok(()) => {
            info!("Connection test successful!");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Connection test failed");
            Err(e)
        }
    }
}

/// Bus forwarding events into a channel for the probe
struct ProbeBus {
    tx: mpsc::UnboundedSender<(String, SocketEvent)>,
}

impl EventBus for ProbeBus {
    fn emit(&self, name: &str, event: &SocketEvent) {
        let _ = self.tx.send((name.to_string(), event.clone()));
    }
}

/// Store that republishes translated events to the tracing subscriber
struct LogStore;

impl Store for LogStore {
    fn commit(&self, target: &str, payload: Value) {
        info!(handler = %target, %payload, "store commit");
    }
    fn dispatch(&self, target: &str, payload: Value) {
        info!(handler = %target, %payload, "store dispatch");
    }
}

fn init_tracing(logging_config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if logging_config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
