//! Configuration for classmoji-relay
//!
//! Loaded from `classmoji-relay.toml`; every field has a built-in default so
//! the relay starts with no file at all:
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 4000
//!
//! [discovery]
//! scan_root = ".."
//! marker_file = ".env"
//! base_port = 4001
//! stride = 10
//! target_host = "localhost"
//!
//! [forward]
//! request_timeout_ms = 30000
//! # max_body_bytes = 26214400   # unset: bodies of any size are relayed
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{RelayError, RelayResult};
use classmoji_common::config::LoggingConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listening address of the relay itself
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Well-known port webhook providers deliver to
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Sibling-directory target discovery
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Directory whose immediate subdirectories are scanned
    #[serde(default = "default_scan_root")]
    pub scan_root: PathBuf,

    /// File looked up in each subdirectory for a `DEVPORT_ID=<n>` line
    #[serde(default = "default_marker_file")]
    pub marker_file: String,

    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Port distance between consecutive instance ids
    #[serde(default = "default_stride")]
    pub stride: u16,

    /// Always-included target; `base_port` when unset
    #[serde(default)]
    pub default_port: Option<u16>,

    /// Host every target is reached on
    #[serde(default = "default_target_host")]
    pub target_host: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_root: default_scan_root(),
            marker_file: default_marker_file(),
            base_port: default_base_port(),
            stride: default_stride(),
            default_port: None,
            target_host: default_target_host(),
        }
    }
}

impl DiscoveryConfig {
    pub fn effective_default_port(&self) -> u16 {
        self.default_port.unwrap_or(self.base_port)
    }
}

/// Outbound forwarding limits
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Opt-in cap on inbound bodies; larger deliveries are not relayed
    #[serde(default)]
    pub max_body_bytes: Option<usize>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_body_bytes: None,
        }
    }
}

impl ForwardConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Byte limit for buffering an inbound body
    pub fn body_limit(&self) -> usize {
        self.max_body_bytes.unwrap_or(usize::MAX)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_scan_root() -> PathBuf {
    PathBuf::from("..")
}

fn default_marker_file() -> String {
    ".env".to_string()
}

fn default_base_port() -> u16 {
    4001
}

fn default_stride() -> u16 {
    10
}

fn default_target_host() -> String {
    "localhost".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl RelayConfig {
    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> RelayResult<()> {
        if self.discovery.marker_file.trim().is_empty() {
            return Err(RelayError::Config("discovery.marker_file must not be empty".to_string()));
        }
        if self.discovery.target_host.trim().is_empty() {
            return Err(RelayError::Config("discovery.target_host must not be empty".to_string()));
        }
        if self.forward.max_body_bytes == Some(0) {
            return Err(RelayError::Config("forward.max_body_bytes must be positive when set".to_string()));
        }
        if self.forward.request_timeout_ms == 0 {
            return Err(RelayError::Config("forward.request_timeout_ms must be positive".to_string()));
        }
        if self.discovery.effective_default_port() == self.server.port {
            return Err(RelayError::Config(format!(
                "default target port {} equals the relay's own port",
                self.server.port
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.discovery.base_port, 4001);
        assert_eq!(config.discovery.stride, 10);
        assert_eq!(config.discovery.effective_default_port(), 4001);
        assert_eq!(config.forward.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.forward.max_body_bytes, None);
        assert_eq!(config.forward.body_limit(), usize::MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: RelayConfig = toml::from_str(
            r#"
            [discovery]
            base_port = 5001
            default_port = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.discovery.base_port, 5001);
        assert_eq!(config.discovery.effective_default_port(), 5000);
        assert_eq!(config.discovery.marker_file, ".env");
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_validate_rejects_self_target() {
        let mut config = RelayConfig::default();
        config.discovery.default_port = Some(config.server.port);
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_body_limit_opt_in() {
        let config: RelayConfig = toml::from_str(
            r#"
            [forward]
            max_body_bytes = 26214400
            "#,
        )
        .unwrap();
        assert_eq!(config.forward.body_limit(), 25 * 1024 * 1024);
        assert!(config.validate().is_ok());

        let mut config = RelayConfig::default();
        config.forward.max_body_bytes = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = RelayConfig::default();
        config.forward.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
