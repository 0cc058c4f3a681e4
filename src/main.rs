// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! EmberLink - Fire-Sensor Serial Bridge
//!
//! Reads the flame-sensor board over serial (or simulates it), fans sensor
//! events and alerts out to WebSocket subscribers, and proxies camera feeds
//! to the dashboard as multipart picture streams.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use emberlink::{
    core::{AlertEngine, Hub, LogLevel},
    http::{self, AppState},
    proxy::StreamProxy,
    sensors::LinkManager,
    streaming::{Dispatcher, WebSocketServer},
    Config, VERSION,
};

/// Grace period for listeners and the link task after the shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// EmberLink - Fire-Sensor Serial Bridge
#[derive(Parser, Debug)]
#[command(name = "emberlink")]
#[command(author = "EmberLink Project")]
#[command(version = VERSION)]
#[command(about = "Fire-sensor serial bridge with real-time alerts and camera proxy")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP server port
    #[arg(short, long)]
    port: Option<u16>,

    /// WebSocket server port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Serial device, skipping discovery
    #[arg(long)]
    serial_port: Option<String>,

    /// Start with simulated sensors instead of searching for a device
    #[arg(long)]
    simulate: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; explicit flags win over RUST_LOG
    let filter = if args.trace {
        EnvFilter::new("trace")
    } else if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🔥 EmberLink v{} - Fire-Sensor Serial Bridge", VERSION);

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Override with command line args
    if let Some(port) = args.port {
        config.server.http_port = port;
    }
    if let Some(port) = args.ws_port {
        config.server.websocket_port = port;
    }
    if let Some(serial_port) = args.serial_port {
        config.link.port = Some(serial_port);
    }
    if args.simulate {
        config.simulate_only = true;
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Simulation only: {}", config.simulate_only);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    // Dropping the runtime drops every remaining task, which kills any
    // transcoder still attached to an open stream.
    drop(rt);
    info!("EmberLink shutdown complete");

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let hub = Hub::new(&config.log);
    let alert = AlertEngine::new(hub.clone());
    hub.log(LogLevel::Info, format!("EmberLink v{} starting", VERSION));

    // Serial link
    let (link_manager, link) = LinkManager::new(
        config.link.clone(),
        config.simulation.clone(),
        alert.clone(),
        config.simulate_only,
    );
    let link_task = tokio::spawn(link_manager.run(shutdown_tx.subscribe()));

    // Real-time channel
    let dispatcher = Dispatcher::new(link, alert.clone());
    let ws_server = WebSocketServer::new(&config.server, hub.clone(), dispatcher);
    ws_server.start(shutdown_tx.subscribe()).await?;

    // HTTP surface
    let proxy = StreamProxy::new(config.stream.clone(), hub.clone())?;
    let state = AppState::new(alert, proxy, config.cameras.clone());
    let listener = TcpListener::bind((config.server.bind_address.as_str(), config.server.http_port)).await?;
    let http_task = tokio::spawn(http::serve(listener, state, shutdown_tx.subscribe()));

    info!("🚀 EmberLink running");
    info!("   Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    let _ = shutdown_tx.send(());
    let closed = hub.close_all();
    info!("Closed {} subscriber channel(s)", closed);

    if tokio::time::timeout(SHUTDOWN_GRACE, link_task).await.is_err() {
        warn!("Link manager did not stop in time");
    }
    // Open camera streams never end on their own, so the HTTP server only
    // gets a bounded wait before the runtime drops them.
    match tokio::time::timeout(SHUTDOWN_GRACE, http_task).await {
        Ok(Ok(Err(e))) => warn!("HTTP server error: {}", e),
        Err(_) => info!("Dropping open camera streams"),
        _ => {}
    }

    Ok(())
}
