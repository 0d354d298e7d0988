//! Resolution of the writable base directories.
//!
//! A [`StorageRootProvider`] supplies the preferred root, which may be
//! unavailable (missing permission, no platform directory). [`StorageRoots`]
//! pairs it with an always-available fallback so resolution never fails for
//! callers of the store.

use std::fs;
use std::path::{Path, PathBuf};

use directories::{ProjectDirs, UserDirs};
use tracing::warn;

use crate::error::{Result, StoreError};

/// Supplies base directories for history logs and exports.
pub trait StorageRootProvider: Send + Sync {
    /// Root under which the history directory lives.
    fn resolve(&self) -> Result<PathBuf>;

    /// Root under which the export directory lives.
    fn resolve_export(&self) -> Result<PathBuf> {
        self.resolve()
    }
}

/// Explicit directories.
#[derive(Debug, Clone)]
pub struct FixedStorageRoot {
    root: PathBuf,
    export_root: Option<PathBuf>,
}

impl FixedStorageRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            export_root: None,
        }
    }

    pub fn with_export_root(mut self, export_root: impl Into<PathBuf>) -> Self {
        self.export_root = Some(export_root.into());
        self
    }
}

impl StorageRootProvider for FixedStorageRoot {
    fn resolve(&self) -> Result<PathBuf> {
        Ok(self.root.clone())
    }

    fn resolve_export(&self) -> Result<PathBuf> {
        Ok(self.export_root.clone().unwrap_or_else(|| self.root.clone()))
    }
}

/// The user's documents directory, where history stays visible to the user:
/// - Linux:   `~/Documents` (XDG_DOCUMENTS_DIR)
/// - macOS:   `~/Documents`
/// - Windows: `{FOLDERID_Documents}`
#[derive(Debug, Clone, Default)]
pub struct PlatformStorageRoot {
    export_root: Option<PathBuf>,
}

impl PlatformStorageRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_export_root(mut self, export_root: impl Into<PathBuf>) -> Self {
        self.export_root = Some(export_root.into());
        self
    }
}

impl StorageRootProvider for PlatformStorageRoot {
    fn resolve(&self) -> Result<PathBuf> {
        UserDirs::new()
            .and_then(|dirs| dirs.document_dir().map(Path::to_path_buf))
            .ok_or_else(|| StoreError::StorageUnavailable("no documents directory".to_string()))
    }

    fn resolve_export(&self) -> Result<PathBuf> {
        match &self.export_root {
            Some(dir) => Ok(dir.clone()),
            None => self.resolve(),
        }
    }
}

/// Application-private data directory, used when the provider fails:
/// - Linux:   `~/.local/share/jerrycan`
/// - macOS:   `~/Library/Application Support/com.jerrycan.jerrycan`
/// - Windows: `{FOLDERID_RoamingAppData}\jerrycan\jerrycan\data`
pub fn default_fallback_dir() -> PathBuf {
    ProjectDirs::from("com", "jerrycan", "jerrycan")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("jerrycan"))
}

/// A provider plus the fallback used whenever it cannot deliver.
pub struct StorageRoots {
    provider: Box<dyn StorageRootProvider>,
    fallback: PathBuf,
}

impl StorageRoots {
    pub fn new(provider: Box<dyn StorageRootProvider>) -> Self {
        Self::with_fallback(provider, default_fallback_dir())
    }

    pub fn with_fallback(provider: Box<dyn StorageRootProvider>, fallback: PathBuf) -> Self {
        Self { provider, fallback }
    }

    /// Resolved on every call so a permission granted or revoked at runtime
    /// is picked up.
    pub fn root(&self) -> PathBuf {
        self.usable(self.provider.resolve(), "storage")
    }

    pub fn export_root(&self) -> PathBuf {
        self.usable(self.provider.resolve_export(), "export")
    }

    fn usable(&self, resolved: Result<PathBuf>, kind: &str) -> PathBuf {
        let candidate = resolved.and_then(|dir| {
            fs::create_dir_all(&dir)?;
            Ok(dir)
        });
        match candidate {
            Ok(dir) => dir,
            Err(e) => {
                warn!(
                    kind,
                    error = %e,
                    fallback = %self.fallback.display(),
                    "Storage root unavailable, using fallback"
                );
                self.fallback.clone()
            }
        }
    }
}
