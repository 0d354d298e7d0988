use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{FILE_STEM_SEPARATOR, MAX_PEER_ID_LEN, PEER_ID_SEPARATOR};
use crate::error::PeerIdError;

// Peer identity = stable string key, usually a colon-delimited hardware
// address such as `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId(String);

impl PeerId {
    /// Validate and wrap a peer identifier.
    ///
    /// Only ASCII alphanumerics, `:` and `-` are accepted. `_` is reserved for
    /// the file-stem encoding, which keeps [`PeerId::file_stem`] invertible.
    /// Letters are uppercased, so `aa:bb` and `AA:BB` name the same peer and
    /// the same log file.
    pub fn parse(s: &str) -> Result<Self, PeerIdError> {
        if s.is_empty() {
            return Err(PeerIdError::Empty);
        }
        if s.len() > MAX_PEER_ID_LEN {
            return Err(PeerIdError::TooLong {
                len: s.len(),
                max: MAX_PEER_ID_LEN,
            });
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == PEER_ID_SEPARATOR || *c == '-'))
        {
            return Err(PeerIdError::InvalidChar(c));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe key: separators replaced with `_`.
    pub fn file_stem(&self) -> String {
        self.0.replace(PEER_ID_SEPARATOR, &FILE_STEM_SEPARATOR.to_string())
    }

    /// Inverse of [`PeerId::file_stem`].
    pub fn from_file_stem(stem: &str) -> Result<Self, PeerIdError> {
        Self::parse(&stem.replace(FILE_STEM_SEPARATOR, &PEER_ID_SEPARATOR.to_string()))
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PeerId {
    type Error = PeerIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

/// Which side of the link produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "SEND")]
    Outgoing,
    #[serde(rename = "RECEIVE")]
    Incoming,
}

impl Direction {
    pub fn from_incoming(is_incoming: bool) -> Self {
        if is_incoming {
            Self::Incoming
        } else {
            Self::Outgoing
        }
    }
}

/// Transient delivery state.
///
/// Never written to disk: every message read back from a history log carries
/// [`MessageStatus::Delivered`], whatever its in-flight state was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Received,
    Failed,
    Delivered,
}

/// A single message exchanged with a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Producer-assigned identifier. Not persisted.
    pub id: Uuid,
    /// The peer whose history this message belongs to.
    pub peer_id: PeerId,
    /// UTF-8 text, or a hex rendering of a binary payload when `is_hex` is set.
    pub content: String,
    pub is_hex: bool,
    /// Millisecond resolution; sort and dedup key.
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub status: MessageStatus,
}

impl Message {
    /// A text message stamped with the current time.
    pub fn text(peer_id: PeerId, content: impl Into<String>, direction: Direction) -> Self {
        Self::new(peer_id, content.into(), false, direction)
    }

    /// A binary payload given as hex text, stamped with the current time.
    pub fn binary(peer_id: PeerId, hex: impl Into<String>, direction: Direction) -> Self {
        Self::new(peer_id, hex.into(), true, direction)
    }

    fn new(peer_id: PeerId, content: String, is_hex: bool, direction: Direction) -> Self {
        let status = match direction {
            Direction::Outgoing => MessageStatus::Sending,
            Direction::Incoming => MessageStatus::Received,
        };
        Self {
            id: Uuid::new_v4(),
            peer_id,
            content,
            is_hex,
            timestamp: Utc::now().trunc_subsecs(3),
            direction,
            status,
        }
    }

    /// Replace the timestamp, truncated to millisecond precision.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(3);
        self
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }

    /// Epoch milliseconds. Two messages with the same key are treated as the
    /// same message when history is reloaded.
    pub fn dedup_key(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_peer_id_file_stem_roundtrip() {
        let id = PeerId::parse("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(id.file_stem(), "AA_BB_CC_DD_EE_FF");

        let back = PeerId::from_file_stem(&id.file_stem()).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_peer_id_without_separator_roundtrip() {
        let id = PeerId::parse("device-42").unwrap();
        assert_eq!(PeerId::from_file_stem(&id.file_stem()).unwrap(), id);
    }

    #[test]
    fn test_peer_id_case_insensitive() {
        let lower = PeerId::parse("aa:bb:cc").unwrap();
        let upper = PeerId::parse("AA:BB:CC").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.as_str(), "AA:BB:CC");
        assert_eq!(lower.file_stem(), "AA_BB_CC");

        let mixed: PeerId = serde_json::from_str("\"Aa:bB:cc\"").unwrap();
        assert_eq!(mixed, upper);
    }

    #[test]
    fn test_peer_id_rejects_reserved_chars() {
        assert_eq!(PeerId::parse(""), Err(PeerIdError::Empty));
        assert_eq!(PeerId::parse("a_b"), Err(PeerIdError::InvalidChar('_')));
        assert_eq!(PeerId::parse("../x"), Err(PeerIdError::InvalidChar('.')));
        assert!(matches!(
            PeerId::parse(&"a".repeat(MAX_PEER_ID_LEN + 1)),
            Err(PeerIdError::TooLong { .. })
        ));
    }

    #[test]
    fn test_peer_id_serde_validates() {
        let ok: PeerId = serde_json::from_str("\"AA:BB\"").unwrap();
        assert_eq!(ok.as_str(), "AA:BB");
        assert!(serde_json::from_str::<PeerId>("\"a/b\"").is_err());
    }

    #[test]
    fn test_direction_wire_names() {
        assert_eq!(serde_json::to_string(&Direction::Outgoing).unwrap(), "\"SEND\"");
        assert_eq!(serde_json::to_string(&Direction::Incoming).unwrap(), "\"RECEIVE\"");
    }

    #[test]
    fn test_timestamp_truncated_to_millis() {
        let peer = PeerId::parse("AA:BB").unwrap();
        let ts = Utc.timestamp_opt(1_714_564_800, 123_456_789).unwrap();
        let msg = Message::text(peer, "hi", Direction::Outgoing).with_timestamp(ts);
        assert_eq!(msg.timestamp.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(msg.dedup_key(), 1_714_564_800_123);
    }
}
