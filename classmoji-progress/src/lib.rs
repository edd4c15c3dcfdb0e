//! classmoji-progress library interface
//!
//! Serves import progress to browsers over SSE. Import jobs publish into
//! the process-local progress store; each browser subscribes through
//! `GET /api/import/stream/:import_id`.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use crate::config::ServiceConfig;
use axum::Router;
use chrono::{DateTime, Utc};
use classmoji_common::progress::{ProgressStore, ProgressStreamManager};
use classmoji_common::time;
use classmoji_common::session::{DisabledVerifier, SessionVerifier, SharedTokenVerifier};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Progress channel store (in-memory by default)
    pub store: Arc<dyn ProgressStore>,
    /// Session check for the import routes
    pub verifier: Arc<dyn SessionVerifier>,
    /// SSE keep-alive comment interval
    pub keep_alive: Duration,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        verifier: Arc<dyn SessionVerifier>,
        keep_alive: Duration,
    ) -> Self {
        Self {
            store,
            verifier,
            keep_alive,
            startup_time: time::now(),
        }
    }

    /// State with an in-memory store; must be called inside a Tokio runtime
    pub fn from_config(config: &ServiceConfig) -> Self {
        let store = Arc::new(ProgressStreamManager::new(config.progress.clone()));

        let verifier: Arc<dyn SessionVerifier> = match &config.session.token {
            Some(token) if !token.trim().is_empty() => Arc::new(SharedTokenVerifier::new(token.trim())),
            _ => {
                warn!("No session token configured: import streams are open to any client");
                Arc::new(DisabledVerifier)
            }
        };

        Self::new(store, verifier, config.stream.keep_alive())
    }
}

/// Build application router
///
/// Import routes require a session; `/health` does not.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let protected = Router::new()
        .route("/api/import/stream/:import_id", get(api::import_progress_stream))
        .route("/api/import/:import_id/events", post(api::publish_progress))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_middleware,
        ));

    Router::new()
        .merge(protected)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
