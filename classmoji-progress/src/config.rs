//! Configuration for classmoji-progress
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 4100
//!
//! [progress]
//! grace_period_ms = 5000
//! max_age_secs = 3600
//!
//! [stream]
//! keep_alive_secs = 15
//!
//! [session]
//! token = "..."   # omit to disable session checks
//!
//! [logging]
//! level = "info"
//! ```

use classmoji_common::config::LoggingConfig;
use classmoji_common::progress::ProgressConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
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

/// SSE transport settings
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Interval between keep-alive comments on idle streams
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl StreamConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

/// Session check settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Token issued by the Classmoji web app; `None` disables the check
    #[serde(default)]
    pub token: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4100
}

fn default_keep_alive_secs() -> u64 {
    15
}
