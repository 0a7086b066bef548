//! Header cache configuration
//!
//! Values come from `HEADER_CACHE_*` environment variables or a JSON file,
//! falling back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Port peers serve the listing API on by default
pub const DEFAULT_PEER_PORT: u16 = 7754;

/// Header cache configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Peer to sync from; empty for a purely local cache
    pub remote_host: String,
    pub remote_port: u16,
    /// Store directory; empty for an in-memory store
    pub local_path: String,
    /// Deadline for one listing request in seconds
    pub request_timeout_secs: u64,
    /// Deadline for connecting to the peer in seconds
    pub connect_timeout_secs: u64,
    /// Pause between scheduled sync runs in seconds
    pub sync_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remote_host: String::new(),
            remote_port: DEFAULT_PEER_PORT,
            local_path: String::new(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            sync_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    /// Config bound to a peer and store path, other values default
    pub fn new(remote_host: &str, remote_port: u16, local_path: &str) -> Self {
        Self {
            remote_host: remote_host.to_string(),
            remote_port,
            local_path: local_path.to_string(),
            ..Self::default()
        }
    }

    /// Read configuration from the environment
    ///
    /// `HEADER_CACHE_HOST`, `HEADER_CACHE_PORT`, `HEADER_CACHE_PATH`,
    /// `HEADER_CACHE_TIMEOUT_SECS`, `HEADER_CACHE_CONNECT_TIMEOUT_SECS`,
    /// `HEADER_CACHE_SYNC_INTERVAL_SECS`. Unparseable numbers keep their default.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            remote_host: lookup("HEADER_CACHE_HOST").unwrap_or(defaults.remote_host),
            remote_port: lookup("HEADER_CACHE_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.remote_port),
            local_path: lookup("HEADER_CACHE_PATH").unwrap_or(defaults.local_path),
            request_timeout_secs: number("HEADER_CACHE_TIMEOUT_SECS", defaults.request_timeout_secs),
            connect_timeout_secs: number(
                "HEADER_CACHE_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            sync_interval_secs: number(
                "HEADER_CACHE_SYNC_INTERVAL_SECS",
                defaults.sync_interval_secs,
            ),
        }
    }

    /// Read a JSON config file; missing keys keep their default
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

/// Default persistent store location for the daemon
pub fn default_local_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("header-cache")
}
