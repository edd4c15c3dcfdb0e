//! classmoji-progress - Import progress streaming service
//!
//! Import jobs publish step-by-step progress; browsers follow it over SSE
//! and get the full history even if they connect late.

use anyhow::{Context, Result};
use clap::Parser;
use classmoji_common::config::{init_tracing, load_service_config};
use classmoji_progress::config::ServiceConfig;
use classmoji_progress::{build_router, AppState};
use std::path::PathBuf;
use tokio::signal;
use tracing::info;

const SERVICE: &str = "classmoji-progress";

/// Command-line arguments for classmoji-progress
#[derive(Parser, Debug)]
#[command(name = "classmoji-progress")]
#[command(about = "Import progress SSE service for Classmoji")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CLASSMOJI_PROGRESS_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "CLASSMOJI_PROGRESS_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CLASSMOJI_PROGRESS_PORT")]
    port: Option<u16>,

    /// Session token expected from clients
    #[arg(long, env = "CLASSMOJI_SESSION_TOKEN", hide_env_values = true)]
    session_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = load_service_config::<ServiceConfig>(args.config.as_deref(), SERVICE)
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
    if let Some(token) = args.session_token {
        config.session.token = Some(token);
    }

    info!(
        "Progress channels: grace period {:?}, max age {:?}, keep-alive {:?}",
        config.progress.grace_period(),
        config.progress.max_age(),
        config.stream.keep_alive()
    );

    let state = AppState::from_config(&config);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

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
