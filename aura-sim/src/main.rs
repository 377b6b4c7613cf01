//! AuraSync simulator - Main entry point
//!
//! Runs one host and N clients over the in-process radio and serves the
//! control/observer API.

use std::path::PathBuf;

use anyhow::{Context, Result};
use aura_common::config::ConfigResolver;
use aura_sim::api::{self, AppContext};
use aura_sim::{parse_library_entry, SimulationBuilder};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for aura-sim
#[derive(Parser, Debug)]
#[command(name = "aura-sim")]
#[command(about = "Playback sync simulator: one host, N clients, in-process radio")]
#[command(version)]
struct Args {
    /// Config file (overrides AURASYNC_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for the HTTP API
    #[arg(short, long, env = "AURASYNC_PORT")]
    port: Option<u16>,

    /// Number of simulated clients
    #[arg(long, default_value = "2", env = "AURASYNC_CLIENTS")]
    clients: usize,

    /// Host push interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Drift tolerated before a client seeks, in milliseconds
    #[arg(long)]
    dead_band_ms: Option<u32>,

    /// Tracks in every device's library: `name` or `name=duration_ms`
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "Midnight City.mp3=243000,a.mp3,b.mp3"
    )]
    library: Vec<String>,

    /// Per-client clock rate in permille (e.g. 1000,1015,990)
    #[arg(long, value_delimiter = ',')]
    client_rates: Vec<u32>,

    /// Do not connect clients at startup
    #[arg(long)]
    no_connect: bool,

    /// Log level filter when RUST_LOG is unset
    #[arg(long, env = "AURASYNC_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Resolve configuration before logging so the file can set the level
    let resolver = ConfigResolver::new(args.config.clone());
    let mut config = resolver
        .resolve()
        .context("Failed to load configuration")?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match resolver.config_path() {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    // CLI overrides
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(tick_ms) = args.tick_ms {
        config.sync.tick_interval_ms = tick_ms;
    }
    if let Some(dead_band_ms) = args.dead_band_ms {
        config.sync.dead_band_ms = dead_band_ms;
    }
    config
        .sync
        .validate()
        .context("Invalid sync settings")?;

    let library: Vec<(String, u32)> = args
        .library
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| parse_library_entry(entry))
        .collect();

    info!(
        "Starting AuraSync simulator: {} clients, tick {}ms, dead-band {}ms",
        args.clients, config.sync.tick_interval_ms, config.sync.dead_band_ms
    );
    info!(
        "Library: {}",
        library
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let sim = SimulationBuilder::new(config.sync.clone())
        .clients(args.clients)
        .library(library)
        .client_rates(args.client_rates.clone())
        .start()
        .context("Failed to start simulation")?;

    if !args.no_connect {
        let connected = sim.connect_all().await;
        if connected < sim.clients.len() {
            warn!("{} of {} clients connected", connected, sim.clients.len());
        } else {
            info!("All {} clients subscribed", connected);
        }
    }

    let ctx = AppContext::from_simulation(&sim);
    api::run(ctx, config.http.port, shutdown_signal())
        .await
        .context("HTTP server error")?;

    sim.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
