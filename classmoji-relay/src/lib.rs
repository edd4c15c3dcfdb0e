//! classmoji-relay library interface
//!
//! Webhook fan-out proxy: every inbound request is replicated to all live
//! backend instances, and the caller gets one aggregate `200` response.

pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod forward;

pub use crate::error::{RelayError, RelayResult};

use crate::config::RelayConfig;
use crate::discovery::{DevPortDiscovery, TargetSource};
use crate::forward::Relay;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    /// Largest inbound body that will be relayed (`usize::MAX` when uncapped)
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(relay: Relay, max_body_bytes: usize) -> Self {
        Self {
            relay: Arc::new(relay),
            max_body_bytes,
        }
    }

    /// State for a configured relay using sibling-directory discovery
    pub fn from_config(config: &RelayConfig) -> RelayResult<Self> {
        let discovery = DevPortDiscovery::new(&config.discovery).excluding(config.server.port);
        let targets: Arc<dyn TargetSource> = Arc::new(discovery);
        Self::with_targets(config, targets)
    }

    /// State for a configured relay with an injected target source
    pub fn with_targets(config: &RelayConfig, targets: Arc<dyn TargetSource>) -> RelayResult<Self> {
        let relay = Relay::new(targets, config.discovery.target_host.clone(), &config.forward)?;
        Ok(Self::new(relay, config.forward.body_limit()))
    }
}

/// Build application router
///
/// There are no other routes: the relay must accept any path.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(api::fan_out)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
