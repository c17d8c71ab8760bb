//! relay daemon - line-oriented TCP chat relay
//!
//! Clients connect, send a display name, then every line they send is
//! relayed to everybody else until they send `bye` or disconnect.
//!
//! # Usage
//!
//! ```bash
//! # Listen on port 4000, all interfaces
//! relayd 4000
//!
//! # Loopback only, at most 64 open connections
//! relayd 4000 --host 127.0.0.1 --max-connections 64
//!
//! # Settings from a file (flags still win)
//! relayd --config /etc/relay.toml
//!
//! # Bind address from the environment
//! RELAY_HOST=127.0.0.1 relayd 4000
//!
//! # Enable debug logging
//! RUST_LOG=relayd=debug relayd 4000
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relayd::registry::{spawn_registry, RelayEvent};
use relayd::server::{ChatServer, ConfigFile, ServerConfig};

/// relay daemon - TCP chat relay
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about)]
struct Args {
    /// TCP port to listen on
    port: Option<u16>,

    /// Interface to bind (default 0.0.0.0, or $RELAY_HOST)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Refuse connections beyond this many open at once
    #[arg(long)]
    max_connections: Option<usize>,

    /// TOML file with host/port/max_connections
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Reads the bind address from `RELAY_HOST`, if set.
fn env_host() -> Result<Option<IpAddr>> {
    match env::var("RELAY_HOST") {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("RELAY_HOST is not an IP address: {value}")),
        Err(_) => Ok(None),
    }
}

/// Merges flags, environment and config file.
///
/// Returns `None` when no port was given anywhere.
fn resolve_config(args: &Args) -> Result<Option<ServerConfig>> {
    let file = match &args.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };

    let host = match args.host {
        Some(host) => Some(host),
        None => env_host()?,
    };

    Ok(file.resolve(args.port, host, args.max_connections))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let Some(config) = resolve_config(&args)? else {
        println!("Missing port to listen on.\nTry relayd <PORT>");
        process::exit(0);
    };

    run_server(config)
}

/// Runs the relay (async entry point).
#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relayd=info".parse()?)
                .add_directive("relay=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "relay daemon starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // Spawn the session registry
    let registry = spawn_registry();

    // Status output: render relay events
    spawn_event_log(registry.subscribe(), cancel_token.clone());

    ChatServer::start(&config, registry, cancel_token)
        .await
        .with_context(|| format!("Failed to start relay on {}", config.socket_addr()))?;

    info!("relay daemon stopped");
    Ok(())
}

/// Spawns the task that renders relay events as status lines.
fn spawn_event_log(mut events: broadcast::Receiver<RelayEvent>, cancel_token: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,

                result = events.recv() => {
                    match result {
                        Ok(event @ RelayEvent::FatalError { .. }) => {
                            error!(target: "relay::status", "{event}");
                        }
                        Ok(event) => {
                            info!(target: "relay::status", "{event}");
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Event log lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    });
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
