//! # jerrycan-store
//!
//! Durable message history for paired devices.
//!
//! Each peer's history lives in its own append-only JSON Lines file under
//! `<storage root>/MessageHistory/`. Writes go through an in-memory
//! write-behind cache and reach the log when a per-peer count threshold is
//! hit, on an explicit flush, or on shutdown via
//! [`HistoryStore::ensure_persistence`].
//!
//! [`HistoryStore`] is the only type the transport and presentation layers are
//! expected to call. Its async operations never fail: I/O and decode errors
//! are logged and turned into an empty / `None` / `false` result.

pub mod cache;
pub mod config;
pub mod device_log;
pub mod export;
pub mod history;
pub mod record;
pub mod storage_root;

mod error;

pub use cache::WriteBehindCache;
pub use config::StoreConfig;
pub use device_log::DeviceLog;
pub use error::{Result, StoreError};
pub use history::HistoryStore;
pub use record::Record;
pub use storage_root::{FixedStorageRoot, PlatformStorageRoot, StorageRootProvider, StorageRoots};
