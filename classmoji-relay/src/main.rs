//! classmoji-relay - Webhook fan-out proxy
//!
//! Listens on the well-known webhook port and replicates every delivery to
//! the default backend plus each sibling checkout that declares a
//! `DEVPORT_ID`.

use anyhow::{Context, Result};
use clap::Parser;
use classmoji_common::config::{init_tracing, load_service_config};
use classmoji_relay::config::RelayConfig;
use classmoji_relay::{build_router, AppState};
use std::path::PathBuf;
use tokio::signal;
use tracing::info;

const SERVICE: &str = "classmoji-relay";

/// Command-line arguments for classmoji-relay
#[derive(Parser, Debug)]
#[command(name = "classmoji-relay")]
#[command(about = "Webhook fan-out relay for Classmoji dev instances")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CLASSMOJI_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "CLASSMOJI_RELAY_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CLASSMOJI_RELAY_PORT")]
    port: Option<u16>,

    /// Directory whose subdirectories are scanned for marker files
    #[arg(long, env = "CLASSMOJI_RELAY_SCAN_ROOT")]
    scan_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = load_service_config::<RelayConfig>(args.config.as_deref(), SERVICE)
        .context("Failed to load configuration")?;
    init_tracing(&loaded.config.logging).context("Failed to initialize tracing")?;

    info!("Starting {} v{}", SERVICE, env!("CARGO_PKG_VERSION"));
    loaded.log_source(SERVICE);

    let mut config = loaded.config;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(scan_root) = args.scan_root {
        config.discovery.scan_root = scan_root;
    }
    config.validate()?;

    info!(
        "Discovery: scanning {} for {} (base port {}, stride {}, default port {})",
        config.discovery.scan_root.display(),
        config.discovery.marker_file,
        config.discovery.base_port,
        config.discovery.stride,
        config.discovery.effective_default_port()
    );

    let state = AppState::from_config(&config)?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
