//! Relay target discovery
//!
//! Targets are resolved fresh for every inbound request: dev instances come
//! and go between webhook deliveries, so nothing is cached.
//!
//! [`DevPortDiscovery`] finds sibling checkouts (e.g. git worktrees) that
//! each run their own backend. A checkout opts in with a marker file
//! containing `DEVPORT_ID=<n>`; its backend listens on
//! `base_port + n * stride`.

use crate::config::DiscoveryConfig;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Marker key looked up in each sibling's marker file
pub const DEVPORT_ID_KEY: &str = "DEVPORT_ID";

/// A relay target; the host is shared by all targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Endpoint {
    pub port: u16,
}

impl Endpoint {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Source of relay targets
///
/// Called on a blocking thread once per inbound request.
pub trait TargetSource: Send + Sync {
    /// Current target set; must not fail
    fn list_targets(&self) -> BTreeSet<Endpoint>;

    /// Targets to use if `list_targets` could not run at all
    fn fallback_targets(&self) -> BTreeSet<Endpoint> {
        BTreeSet::new()
    }
}

/// Fixed target list
#[derive(Debug, Clone, Default)]
pub struct StaticTargets {
    targets: BTreeSet<Endpoint>,
}

impl StaticTargets {
    pub fn new(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            targets: ports.into_iter().map(Endpoint::new).collect(),
        }
    }
}

impl TargetSource for StaticTargets {
    fn list_targets(&self) -> BTreeSet<Endpoint> {
        self.targets.clone()
    }

    fn fallback_targets(&self) -> BTreeSet<Endpoint> {
        self.targets.clone()
    }
}

/// Sibling-directory scan for `DEVPORT_ID` marker files
#[derive(Debug, Clone)]
pub struct DevPortDiscovery {
    scan_root: PathBuf,
    marker_file: String,
    base_port: u16,
    stride: u16,
    default_port: u16,
    /// The relay's own port; a marker resolving to it would loop requests back
    relay_port: Option<u16>,
}

impl DevPortDiscovery {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            scan_root: config.scan_root.clone(),
            marker_file: config.marker_file.clone(),
            base_port: config.base_port,
            stride: config.stride,
            default_port: config.effective_default_port(),
            relay_port: None,
        }
    }

    /// Never report `port` as a target
    pub fn excluding(mut self, port: u16) -> Self {
        self.relay_port = Some(port);
        self
    }

    /// `base_port + id * stride`, or `None` if that leaves the port range
    pub fn port_for(&self, id: u32) -> Option<u16> {
        let port = u32::from(self.stride)
            .checked_mul(id)?
            .checked_add(u32::from(self.base_port))?;
        u16::try_from(port).ok()
    }
}

impl TargetSource for DevPortDiscovery {
    fn list_targets(&self) -> BTreeSet<Endpoint> {
        let mut targets = self.fallback_targets();

        let siblings = WalkDir::new(&self.scan_root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true);

        for entry in siblings {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        "Discovery: skipping unreadable entry under {}: {}",
                        self.scan_root.display(),
                        e
                    );
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let marker = entry.path().join(&self.marker_file);
            let content = match std::fs::read_to_string(&marker) {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Discovery: cannot read {}: {}", marker.display(), e);
                    continue;
                }
            };

            let Some(id) = parse_devport_id(&content) else {
                debug!("Discovery: no usable {} in {}", DEVPORT_ID_KEY, marker.display());
                continue;
            };

            match self.port_for(id) {
                Some(port) if Some(port) == self.relay_port => warn!(
                    "Discovery: {} in {} resolves to the relay's own port {}; skipped",
                    DEVPORT_ID_KEY,
                    marker.display(),
                    port
                ),
                Some(port) => {
                    debug!("Discovery: {} -> port {}", entry.path().display(), port);
                    targets.insert(Endpoint::new(port));
                }
                None => warn!(
                    "Discovery: {}={} in {} is outside the port range",
                    DEVPORT_ID_KEY,
                    id,
                    marker.display()
                ),
            }
        }

        targets
    }

    fn fallback_targets(&self) -> BTreeSet<Endpoint> {
        BTreeSet::from([Endpoint::new(self.default_port)])
    }
}

/// Extract the `DEVPORT_ID` value from env-file content
///
/// Accepts `DEVPORT_ID=3`, `export DEVPORT_ID=3` and quoted values. The
/// first `DEVPORT_ID` assignment decides; a malformed value yields `None`.
pub fn parse_devport_id(content: &str) -> Option<u32> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            line.split_once('=')
        })
        .find(|(key, _)| key.trim() == DEVPORT_ID_KEY)
        .and_then(|(_, value)| {
            value
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .parse::<u32>()
                .ok()
        })
}
