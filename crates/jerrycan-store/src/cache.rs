//! In-memory write-behind buffer, keyed by peer.
//!
//! Each entry holds the messages not yet written to the peer's log
//! (`pending`) and, once a paged read has loaded the history from disk, a
//! hydrated `view` of the whole conversation. Flushing only ever hands out
//! `pending`, so history that came from disk is never appended twice.
//!
//! The map lock is held for the duration of a single call and never across
//! I/O. Serializing multi-step operations on one peer is the caller's job.
//!
//! Buffers are unbounded. Nothing is evicted; memory is reclaimed by flushing
//! (for pending messages) or [`WriteBehindCache::remove`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use jerrycan_shared::{Message, PeerId};

#[derive(Debug, Default)]
struct PeerBuffer {
    pending: Vec<Message>,
    view: Option<Vec<Message>>,
}

#[derive(Debug)]
pub struct WriteBehindCache {
    entries: Mutex<HashMap<PeerId, PeerBuffer>>,
    flush_threshold: usize,
}

impl WriteBehindCache {
    /// `flush_threshold` is clamped to at least 1.
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            flush_threshold: flush_threshold.max(1),
        }
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// Buffer a message. Returns `true` once the peer's pending buffer has
    /// reached the flush threshold.
    pub fn put(&self, peer_id: &PeerId, message: Message) -> bool {
        let mut entries = self.lock();
        let buffer = entries.entry(peer_id.clone()).or_default();
        if let Some(view) = buffer.view.as_mut() {
            view.push(message.clone());
        }
        buffer.pending.push(message);
        buffer.pending.len() >= self.flush_threshold
    }

    /// Overwrite the pending buffer wholesale. Any hydrated view is dropped
    /// since the log is about to change underneath it.
    pub fn replace(&self, peer_id: &PeerId, messages: Vec<Message>) {
        let mut entries = self.lock();
        entries.insert(
            peer_id.clone(),
            PeerBuffer {
                pending: messages,
                view: None,
            },
        );
    }

    /// Current contents without clearing: the hydrated view if there is one,
    /// otherwise the pending buffer. `None` when the peer has no entry.
    pub fn peek(&self, peer_id: &PeerId) -> Option<Vec<Message>> {
        let entries = self.lock();
        entries.get(peer_id).map(|buffer| match &buffer.view {
            Some(view) => view.clone(),
            None => buffer.pending.clone(),
        })
    }

    /// The hydrated view, if a full history has been loaded for this peer.
    pub fn view(&self, peer_id: &PeerId) -> Option<Vec<Message>> {
        self.lock()
            .get(peer_id)
            .and_then(|buffer| buffer.view.clone())
    }

    /// Messages not yet written to disk, in arrival order.
    pub fn pending(&self, peer_id: &PeerId) -> Vec<Message> {
        self.lock()
            .get(peer_id)
            .map(|buffer| buffer.pending.clone())
            .unwrap_or_default()
    }

    /// Install a full history view. Pending messages are kept.
    pub fn hydrate(&self, peer_id: &PeerId, view: Vec<Message>) {
        let mut entries = self.lock();
        entries.entry(peer_id.clone()).or_default().view = Some(view);
    }

    /// Take the pending buffer. An entry without a hydrated view is removed
    /// altogether, so the next paged read goes back to disk.
    pub fn drain(&self, peer_id: &PeerId) -> Vec<Message> {
        let mut entries = self.lock();
        let Some(buffer) = entries.get_mut(peer_id) else {
            return Vec::new();
        };
        let drained = std::mem::take(&mut buffer.pending);
        if buffer.view.is_none() {
            entries.remove(peer_id);
        }
        drained
    }

    /// Put drained messages back in front of the pending buffer after a
    /// failed write. The hydrated view already holds them and is untouched.
    pub fn requeue(&self, peer_id: &PeerId, mut messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        let mut entries = self.lock();
        let buffer = entries.entry(peer_id.clone()).or_default();
        messages.append(&mut buffer.pending);
        buffer.pending = messages;
    }

    /// Drain every peer that has pending messages.
    pub fn drain_all(&self) -> HashMap<PeerId, Vec<Message>> {
        let mut entries = self.lock();
        let mut drained = HashMap::new();
        for (peer_id, buffer) in entries.iter_mut() {
            if !buffer.pending.is_empty() {
                drained.insert(peer_id.clone(), std::mem::take(&mut buffer.pending));
            }
        }
        entries.retain(|_, buffer| buffer.view.is_some());
        drained
    }

    /// Peers that currently have pending messages.
    pub fn dirty_peers(&self) -> Vec<PeerId> {
        self.lock()
            .iter()
            .filter(|(_, buffer)| !buffer.pending.is_empty())
            .map(|(peer_id, _)| peer_id.clone())
            .collect()
    }

    pub fn remove(&self, peer_id: &PeerId) {
        self.lock().remove(peer_id);
    }

    // A panic while the lock was held cannot leave a buffer half-written
    // (every mutation is a single push/insert/take), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<PeerId, PeerBuffer>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jerrycan_shared::Direction;

    fn peer(s: &str) -> PeerId {
        PeerId::parse(s).unwrap()
    }

    fn msg(peer_id: &PeerId, text: &str) -> Message {
        Message::text(peer_id.clone(), text, Direction::Outgoing)
    }

    #[test]
    fn test_put_reports_threshold() {
        let cache = WriteBehindCache::new(3);
        let p = peer("AA:BB");
        assert!(!cache.put(&p, msg(&p, "1")));
        assert!(!cache.put(&p, msg(&p, "2")));
        assert!(cache.put(&p, msg(&p, "3")));
    }

    #[test]
    fn test_zero_threshold_clamped() {
        let cache = WriteBehindCache::new(0);
        let p = peer("AA:BB");
        assert_eq!(cache.flush_threshold(), 1);
        assert!(cache.put(&p, msg(&p, "1")));
    }

    #[test]
    fn test_peek_absent_vs_present() {
        let cache = WriteBehindCache::new(10);
        let p = peer("AA:BB");
        assert!(cache.peek(&p).is_none());

        cache.put(&p, msg(&p, "1"));
        assert_eq!(cache.peek(&p).unwrap().len(), 1);
        // peek does not clear
        assert_eq!(cache.peek(&p).unwrap().len(), 1);
    }

    #[test]
    fn test_drain_clears_and_removes_cold_entry() {
        let cache = WriteBehindCache::new(10);
        let p = peer("AA:BB");
        cache.put(&p, msg(&p, "1"));
        cache.put(&p, msg(&p, "2"));

        assert_eq!(cache.drain(&p).len(), 2);
        assert!(cache.peek(&p).is_none());
        assert!(cache.drain(&p).is_empty());
    }

    #[test]
    fn test_drain_keeps_hydrated_view() {
        let cache = WriteBehindCache::new(10);
        let p = peer("AA:BB");
        cache.hydrate(&p, vec![msg(&p, "old")]);
        cache.put(&p, msg(&p, "new"));

        let drained = cache.drain(&p);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].content, "new");

        let view: Vec<_> = cache.peek(&p).unwrap().into_iter().map(|m| m.content).collect();
        assert_eq!(view, ["old", "new"]);
        assert!(cache.pending(&p).is_empty());
    }

    #[test]
    fn test_requeue_preserves_order() {
        let cache = WriteBehindCache::new(10);
        let p = peer("AA:BB");
        cache.put(&p, msg(&p, "1"));
        cache.put(&p, msg(&p, "2"));
        let drained = cache.drain(&p);
        cache.put(&p, msg(&p, "3"));
        cache.requeue(&p, drained);

        let pending: Vec<_> = cache.pending(&p).into_iter().map(|m| m.content).collect();
        assert_eq!(pending, ["1", "2", "3"]);
    }

    #[test]
    fn test_replace_drops_view() {
        let cache = WriteBehindCache::new(10);
        let p = peer("AA:BB");
        cache.hydrate(&p, vec![msg(&p, "old")]);
        cache.replace(&p, vec![msg(&p, "a"), msg(&p, "b")]);

        assert!(cache.view(&p).is_none());
        assert_eq!(cache.pending(&p).len(), 2);
    }

    #[test]
    fn test_drain_all_only_dirty_peers() {
        let cache = WriteBehindCache::new(10);
        let (a, b, c) = (peer("AA"), peer("BB"), peer("CC"));
        cache.put(&a, msg(&a, "1"));
        cache.put(&b, msg(&b, "1"));
        cache.put(&b, msg(&b, "2"));
        cache.hydrate(&c, vec![msg(&c, "old")]);

        let mut dirty = cache.dirty_peers();
        dirty.sort();
        assert_eq!(dirty, vec![a.clone(), b.clone()]);

        let drained = cache.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[&b].len(), 2);
        assert!(cache.peek(&a).is_none());
        assert!(cache.peek(&c).is_some());
        assert!(cache.drain_all().is_empty());
    }

    #[test]
    fn test_peers_are_independent() {
        let cache = WriteBehindCache::new(10);
        let (a, b) = (peer("AA"), peer("BB"));
        cache.put(&a, msg(&a, "1"));
        cache.remove(&b);
        assert_eq!(cache.pending(&a).len(), 1);
        cache.remove(&a);
        assert!(cache.peek(&a).is_none());
    }
}
