//! History store facade.
//!
//! [`HistoryStore`] ties the write-behind cache to the per-peer logs. Every
//! async operation runs its body on tokio's blocking pool and holds the
//! peer's lock for the whole body, so a save racing a flush or a cold load
//! for the same peer is serialized while different peers proceed in
//! parallel. [`HistoryStore::ensure_persistence`] takes the same locks but
//! runs on the calling thread and needs no runtime.
//!
//! Public operations are fail-soft: errors are logged and mapped to an empty
//! result. Callers cannot tell "no history" from "history unreadable".

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use jerrycan_shared::{Message, PeerId};

use crate::cache::WriteBehindCache;
use crate::config::StoreConfig;
use crate::device_log::{self, DeviceLog};
use crate::error::{Result, StoreError};
use crate::export;
use crate::record::Record;
use crate::storage_root::{FixedStorageRoot, PlatformStorageRoot, StorageRootProvider, StorageRoots};

/// One mutex per peer, created on first use.
#[derive(Default)]
struct PeerLocks {
    locks: Mutex<HashMap<PeerId, Arc<Mutex<()>>>>,
}

impl PeerLocks {
    fn get(&self, peer_id: &PeerId) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(peer_id.clone()).or_default())
    }
}

fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Inner {
    roots: StorageRoots,
    config: StoreConfig,
    cache: WriteBehindCache,
    locks: PeerLocks,
}

/// Message history for every paired peer.
#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<Inner>,
}

impl HistoryStore {
    pub fn new(provider: impl StorageRootProvider + 'static, config: StoreConfig) -> Self {
        Self::with_roots(StorageRoots::new(Box::new(provider)), config)
    }

    pub fn with_roots(roots: StorageRoots, config: StoreConfig) -> Self {
        let cache = WriteBehindCache::new(config.flush_threshold);
        Self {
            inner: Arc::new(Inner {
                roots,
                config,
                cache,
                locks: PeerLocks::default(),
            }),
        }
    }

    /// Build a store from configuration: `data_dir` pins the storage root,
    /// otherwise the platform documents directory is used.
    pub fn from_config(config: StoreConfig) -> Self {
        let provider: Box<dyn StorageRootProvider> = match (&config.data_dir, &config.export_dir) {
            (Some(data), Some(export)) => {
                Box::new(FixedStorageRoot::new(data).with_export_root(export))
            }
            (Some(data), None) => Box::new(FixedStorageRoot::new(data)),
            (None, Some(export)) => Box::new(PlatformStorageRoot::new().with_export_root(export)),
            (None, None) => Box::new(PlatformStorageRoot::new()),
        };
        Self::with_roots(StorageRoots::new(provider), config)
    }

    /// Location of the peer's history log under the current storage root.
    pub fn history_path(&self, peer_id: &PeerId) -> PathBuf {
        self.inner.log(peer_id).path().to_path_buf()
    }

    /// Buffer a message; flushes the peer's buffer once the threshold is hit.
    pub async fn save(&self, message: Message) {
        self.run("save", (), move |inner| inner.save(message)).await
    }

    /// Replace the peer's buffer with `messages` and flush it. Messages that
    /// belong to another peer are dropped.
    pub async fn save_all(&self, peer_id: &PeerId, messages: Vec<Message>) {
        let peer_id = peer_id.clone();
        self.run("save_all", (), move |inner| inner.save_all(&peer_id, messages))
            .await
    }

    /// Full history straight from the log, in file order, bypassing the cache.
    pub async fn load(&self, peer_id: &PeerId) -> Vec<Message> {
        let peer_id = peer_id.clone();
        self.run("load", Vec::new(), move |inner| {
            let lock = inner.locks.get(&peer_id);
            let _guard = acquire(&lock);
            inner.load_from_disk(&peer_id)
        })
        .await
    }

    /// A page of history.
    ///
    /// The first call for a peer loads the log, merges unflushed messages,
    /// drops duplicate millisecond timestamps (first occurrence wins), sorts
    /// ascending and keeps the result in the cache. Later calls page through
    /// that cached view, where newly saved messages are appended in arrival
    /// order without re-sorting.
    pub async fn load_paged(&self, peer_id: &PeerId, offset: usize, limit: usize) -> Vec<Message> {
        let peer_id = peer_id.clone();
        self.run("load_paged", Vec::new(), move |inner| {
            inner.load_paged(&peer_id, offset, limit)
        })
        .await
    }

    /// Newest message by timestamp, preferring the cache when it has any.
    pub async fn last_message(&self, peer_id: &PeerId) -> Option<Message> {
        let peer_id = peer_id.clone();
        self.run("last_message", None, move |inner| inner.last_message(&peer_id))
            .await
    }

    /// Newest message of every peer with history. Peers without messages are
    /// omitted.
    pub async fn all_last_messages(&self) -> HashMap<PeerId, Message> {
        self.run("all_last_messages", HashMap::new(), |inner| {
            inner.all_last_messages()
        })
        .await
    }

    /// Peers with a history log or unflushed messages, sorted.
    pub async fn peers(&self) -> Vec<PeerId> {
        self.run("peers", Vec::new(), |inner| inner.peers()).await
    }

    /// Delete the peer's log and cache entry.
    pub async fn clear(&self, peer_id: &PeerId) -> bool {
        let peer_id = peer_id.clone();
        self.run("clear", false, move |inner| inner.clear(&peer_id))
            .await
    }

    /// Persist the peer's buffer regardless of the threshold. Returns the
    /// number of records appended.
    pub async fn flush(&self, peer_id: &PeerId) -> usize {
        let peer_id = peer_id.clone();
        self.run("flush", 0, move |inner| {
            let lock = inner.locks.get(&peer_id);
            let _guard = acquire(&lock);
            inner.flush_locked(&peer_id)
        })
        .await
    }

    /// Flush every peer with buffered messages.
    pub async fn flush_all(&self) -> usize {
        self.run("flush_all", 0, |inner| Ok(inner.flush_all())).await
    }

    /// Synchronous flush of every buffered message, for process teardown.
    ///
    /// Performs blocking I/O on the calling thread and does not touch the
    /// tokio runtime, so it is safe to call after the runtime has shut down.
    /// Avoid calling it from an async task: it blocks the worker thread.
    pub fn ensure_persistence(&self) -> usize {
        self.inner.ensure_persistence()
    }

    /// Write a human-readable copy of the peer's history to
    /// `<export root>/JerryCan/Export_<peer>.log`. Buffered messages are
    /// flushed first. `None` when there is nothing to export or on failure.
    pub async fn export(&self, peer_id: &PeerId) -> Option<PathBuf> {
        let peer_id = peer_id.clone();
        self.run("export", None, move |inner| inner.export(&peer_id))
            .await
    }

    /// Export every peer with history. Peers that fail are skipped.
    pub async fn export_all(&self) -> Vec<PathBuf> {
        self.run("export_all", Vec::new(), |inner| Ok(inner.export_all()))
            .await
    }

    async fn run<T, F>(&self, op: &'static str, default: T, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let result = tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(StoreError::from)
            .and_then(|r| r);

        match result {
            Ok(value) => value,
            Err(e @ StoreError::Task(_)) => {
                error!(op, error = %e, "History worker failed");
                default
            }
            Err(e) => {
                warn!(op, error = %e, "History operation failed");
                default
            }
        }
    }
}

impl Inner {
    fn history_dir(&self) -> PathBuf {
        self.roots.root().join(&self.config.history_dir_name)
    }

    fn export_dir(&self) -> PathBuf {
        self.roots.export_root().join(&self.config.export_dir_name)
    }

    fn log(&self, peer_id: &PeerId) -> DeviceLog {
        DeviceLog::new(&self.history_dir(), peer_id).with_sync_writes(self.config.sync_writes)
    }

    fn save(&self, message: Message) -> Result<()> {
        let peer_id = message.peer_id.clone();
        let lock = self.locks.get(&peer_id);
        let _guard = acquire(&lock);
        if self.cache.put(&peer_id, message) {
            self.flush_locked(&peer_id)?;
        }
        Ok(())
    }

    fn save_all(&self, peer_id: &PeerId, messages: Vec<Message>) -> Result<()> {
        let (own, foreign): (Vec<_>, Vec<_>) = messages
            .into_iter()
            .partition(|m| &m.peer_id == peer_id);
        if !foreign.is_empty() {
            warn!(peer = %peer_id, dropped = foreign.len(), "Dropping messages for another peer");
        }

        let lock = self.locks.get(peer_id);
        let _guard = acquire(&lock);
        self.cache.replace(peer_id, own);
        self.flush_locked(peer_id)?;
        Ok(())
    }

    /// Caller holds the peer lock.
    fn flush_locked(&self, peer_id: &PeerId) -> Result<usize> {
        let drained = self.cache.drain(peer_id);
        if drained.is_empty() {
            return Ok(0);
        }
        match self.persist(peer_id, &drained) {
            Ok(count) => {
                debug!(peer = %peer_id, count, "Flushed history buffer");
                Ok(count)
            }
            Err(e) => {
                self.cache.requeue(peer_id, drained);
                Err(e)
            }
        }
    }

    fn persist(&self, peer_id: &PeerId, messages: &[Message]) -> Result<usize> {
        let mut records = Vec::with_capacity(messages.len());
        for message in messages {
            match Record::encode(message) {
                Ok(record) => records.push(record),
                Err(e) if e.is_decode() => {
                    warn!(peer = %peer_id, id = %message.id, error = %e, "Dropping unencodable message");
                }
                Err(e) => return Err(e),
            }
        }
        self.log(peer_id).append(&records)
    }

    fn load_from_disk(&self, peer_id: &PeerId) -> Result<Vec<Message>> {
        let records = self.log(peer_id).read_all()?;
        let mut messages = Vec::with_capacity(records.len());
        for record in &records {
            match record.decode(peer_id) {
                Ok(message) => messages.push(message),
                Err(e) if e.is_decode() => {
                    warn!(peer = %peer_id, error = %e, "Skipping undecodable record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(messages)
    }

    fn load_paged(&self, peer_id: &PeerId, offset: usize, limit: usize) -> Result<Vec<Message>> {
        let lock = self.locks.get(peer_id);
        let _guard = acquire(&lock);

        if let Some(view) = self.cache.view(peer_id) {
            return Ok(page(&view, offset, limit));
        }

        let mut merged = self.load_from_disk(peer_id)?;
        merged.extend(self.cache.pending(peer_id));
        let history = dedup_sorted(merged);
        let result = page(&history, offset, limit);
        self.cache.hydrate(peer_id, history);
        Ok(result)
    }

    fn last_message(&self, peer_id: &PeerId) -> Result<Option<Message>> {
        let lock = self.locks.get(peer_id);
        let _guard = acquire(&lock);

        if let Some(cached) = self.cache.peek(peer_id) {
            if !cached.is_empty() {
                return Ok(newest(cached));
            }
        }
        Ok(newest(self.load_from_disk(peer_id)?))
    }

    fn peers(&self) -> Result<Vec<PeerId>> {
        let mut peers = device_log::list_peers(&self.history_dir())?;
        peers.extend(self.cache.dirty_peers());
        peers.sort();
        peers.dedup();
        Ok(peers)
    }

    fn all_last_messages(&self) -> Result<HashMap<PeerId, Message>> {
        let mut last = HashMap::new();
        for peer_id in self.peers()? {
            match self.last_message(&peer_id) {
                Ok(Some(message)) => {
                    last.insert(peer_id, message);
                }
                Ok(None) => {}
                Err(e) => warn!(peer = %peer_id, error = %e, "Skipping unreadable history"),
            }
        }
        Ok(last)
    }

    fn clear(&self, peer_id: &PeerId) -> Result<bool> {
        let lock = self.locks.get(peer_id);
        let _guard = acquire(&lock);
        self.cache.remove(peer_id);
        let deleted = self.log(peer_id).delete()?;
        info!(peer = %peer_id, "Cleared message history");
        Ok(deleted)
    }

    fn flush_all(&self) -> usize {
        let mut total = 0;
        for peer_id in self.cache.dirty_peers() {
            let lock = self.locks.get(&peer_id);
            let _guard = acquire(&lock);
            match self.flush_locked(&peer_id) {
                Ok(count) => total += count,
                Err(e) => warn!(peer = %peer_id, error = %e, "Flush failed"),
            }
        }
        total
    }

    fn ensure_persistence(&self) -> usize {
        let mut total = 0;
        for (peer_id, messages) in self.cache.drain_all() {
            // Waits out any flush of this peer that is still writing, which
            // keeps its batch ahead of ours in the file.
            let lock = self.locks.get(&peer_id);
            let _guard = acquire(&lock);
            match self.persist(&peer_id, &messages) {
                Ok(count) => total += count,
                Err(e) => {
                    error!(peer = %peer_id, error = %e, lost = messages.len(), "Shutdown flush failed");
                    self.cache.requeue(&peer_id, messages);
                }
            }
        }
        if total > 0 {
            info!(count = total, "Persisted buffered history");
        }
        total
    }

    fn export(&self, peer_id: &PeerId) -> Result<Option<PathBuf>> {
        let lock = self.locks.get(peer_id);
        let _guard = acquire(&lock);
        self.flush_locked(peer_id)?;

        let records = self.log(peer_id).read_all()?;
        if records.is_empty() {
            return Ok(None);
        }
        let path = export::write_export(&self.export_dir(), peer_id, &records)?;
        info!(peer = %peer_id, path = %path.display(), count = records.len(), "Exported history");
        Ok(Some(path))
    }

    fn export_all(&self) -> Vec<PathBuf> {
        let peers = match self.peers() {
            Ok(peers) => peers,
            Err(e) => {
                warn!(error = %e, "Could not enumerate histories");
                return Vec::new();
            }
        };

        peers
            .iter()
            .filter_map(|peer_id| match self.export(peer_id) {
                Ok(path) => path,
                Err(e) => {
                    warn!(peer = %peer_id, error = %e, "Export failed");
                    None
                }
            })
            .collect()
    }
}

/// Slice with `offset` and `offset + limit` clamped to the available range.
fn page(messages: &[Message], offset: usize, limit: usize) -> Vec<Message> {
    let start = offset.min(messages.len());
    let end = offset.saturating_add(limit).min(messages.len());
    messages[start..end].to_vec()
}

/// Keep the first message per millisecond timestamp, then sort ascending.
/// Distinct messages sharing a millisecond collapse into one.
fn dedup_sorted(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Message> = messages
        .into_iter()
        .filter(|m| seen.insert(m.dedup_key()))
        .collect();
    unique.sort_by_key(Message::dedup_key);
    unique
}

fn newest(messages: Vec<Message>) -> Option<Message> {
    messages.into_iter().max_by_key(Message::dedup_key)
}
