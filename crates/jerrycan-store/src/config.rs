//! Store configuration loaded from environment variables.
//!
//! Every setting has a default, so `StoreConfig::default()` is a working
//! configuration.

use std::path::PathBuf;

/// Default number of buffered messages per peer that triggers a flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 10;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Buffered messages per peer before an automatic flush.
    /// Env: `JERRYCAN_FLUSH_THRESHOLD`
    /// Default: `10`
    pub flush_threshold: usize,

    /// Directory under the storage root holding one log per peer.
    /// Default: `MessageHistory`
    pub history_dir_name: String,

    /// Directory under the export root receiving exports.
    /// Default: `JerryCan`
    pub export_dir_name: String,

    /// `fsync` after every append.
    /// Env: `JERRYCAN_SYNC_WRITES` (true/false)
    /// Default: `false`
    pub sync_writes: bool,

    /// Explicit storage root, bypassing the platform provider.
    /// Env: `JERRYCAN_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Explicit export root. Falls back to the storage root.
    /// Env: `JERRYCAN_EXPORT_DIR`
    pub export_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            history_dir_name: "MessageHistory".to_string(),
            export_dir_name: "JerryCan".to_string(),
            sync_writes: false,
            data_dir: None,
            export_dir: None,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("JERRYCAN_FLUSH_THRESHOLD") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.flush_threshold = n,
                _ => {
                    tracing::warn!(
                        value = %val,
                        "Invalid JERRYCAN_FLUSH_THRESHOLD, using default"
                    );
                }
            }
        }

        if let Some(val) = lookup("JERRYCAN_SYNC_WRITES") {
            config.sync_writes = val != "false" && val != "0";
        }

        if let Some(path) = lookup("JERRYCAN_DATA_DIR") {
            if !path.is_empty() {
                config.data_dir = Some(PathBuf::from(path));
            }
        }

        if let Some(path) = lookup("JERRYCAN_EXPORT_DIR") {
            if !path.is_empty() {
                config.export_dir = Some(PathBuf::from(path));
            }
        }

        config
    }
}
