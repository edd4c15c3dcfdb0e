//! Configuration loading and tracing setup
//!
//! Each service reads an optional TOML file. Resolution order for the file
//! path:
//! 1. Command-line argument / environment variable (handled by clap)
//! 2. `<config_dir>/classmoji/<service>.toml` (OS-dependent, via `dirs`)
//!
//! A missing file is not an error: the service starts on built-in defaults
//! and logs a warning once tracing is up. A file that exists but does not
//! parse is a startup error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    ///
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// File not found at this path; built-in defaults used
    Missing(PathBuf),
    /// No path could be determined; built-in defaults used
    Defaults,
}

/// A configuration value plus its origin, for startup logging
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub config: T,
    pub source: ConfigSource,
}

impl<T> Loaded<T> {
    /// Log where the configuration came from (call after tracing init)
    pub fn log_source(&self, service: &str) {
        match &self.source {
            ConfigSource::File(path) => {
                info!("{}: configuration loaded from {}", service, path.display())
            }
            ConfigSource::Missing(path) => warn!(
                "{}: config file {} not found, using built-in defaults",
                service,
                path.display()
            ),
            ConfigSource::Defaults => {
                warn!("{}: no config directory available, using built-in defaults", service)
            }
        }
    }
}

/// Default config file location for a service
///
/// e.g. `~/.config/classmoji/classmoji-relay.toml` on Linux
pub fn default_config_path(service: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("classmoji").join(format!("{}.toml", service)))
}

/// Load `T` from an explicit path or the service's default location
pub fn load_service_config<T>(explicit: Option<&Path>, service: &str) -> Result<Loaded<T>>
where
    T: DeserializeOwned + Default,
{
    match explicit
        .map(Path::to_path_buf)
        .or_else(|| default_config_path(service))
    {
        Some(path) => load_toml_config(&path),
        None => Ok(Loaded {
            config: T::default(),
            source: ConfigSource::Defaults,
        }),
    }
}

/// Load `T` from a TOML file, falling back to defaults if it does not exist
pub fn load_toml_config<T>(path: &Path) -> Result<Loaded<T>>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(Loaded {
            config: T::default(),
            source: ConfigSource::Missing(path.to_path_buf()),
        });
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    Ok(Loaded {
        config,
        source: ConfigSource::File(path.to_path_buf()),
    })
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `logging.level`. Fails if a subscriber is already
/// installed or the configured level is not a valid filter.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level).map_err(|e| {
            Error::Config(format!("Invalid log level '{}': {}", logging.level, e))
        })?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Internal(format!("Tracing init failed: {}", e)))
}
