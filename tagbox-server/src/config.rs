//! Server configuration
//!
//! Values come from an optional TOML file with serde defaults; the listen
//! port and root folder can additionally be set from the command line or
//! environment (highest priority), resolved in `main`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tagbox_common::{Error, Result};

/// Server configuration with defaults suitable for an embedded device
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen port
    pub port: u16,

    /// SQLite database URL
    pub database_url: String,

    /// Root folder for final track files
    pub music_root: PathBuf,

    /// Staging folder for in-flight upload chunks
    pub staging_root: PathBuf,

    /// Per-room replay ring buffer size (envelopes)
    pub event_buffer_capacity: usize,

    /// Per-session outbound channel capacity (envelopes)
    pub session_channel_capacity: usize,

    /// Pending operations older than this are force-rejected
    pub operation_ttl_secs: u64,

    /// Upload sessions idle longer than this are expired
    pub upload_idle_timeout_secs: u64,

    /// Default NFC association session timeout (ms)
    pub association_timeout_ms: u64,

    /// Minimum interval between position broadcasts (ms)
    pub position_publish_interval_ms: u64,

    /// Interval between maintenance sweeps (seconds)
    pub sweep_interval_secs: u64,

    /// Maximum accepted upload size (bytes)
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5870,
            database_url: "sqlite://tagbox.db?mode=rwc".to_string(),
            music_root: PathBuf::from("music"),
            staging_root: PathBuf::from("staging"),
            event_buffer_capacity: 256,
            session_channel_capacity: 64,
            operation_ttl_secs: 30,
            upload_idle_timeout_secs: 900,
            association_timeout_ms: 30_000,
            position_publish_interval_ms: 200,
            sweep_interval_secs: 5,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing keys
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Validation(format!("invalid config file {}: {}", path.display(), e)))
    }

    /// Load from a file if one is given, otherwise defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}
