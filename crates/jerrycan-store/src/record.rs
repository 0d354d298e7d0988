//! On-disk representation of one message and the codec between it and
//! [`Message`].
//!
//! A record is one JSON object on one line:
//!
//! ```text
//! {"time":"2024-05-01T12:00:00.123Z","direction":"SEND","content":"Hello","isHex":false}
//! ```
//!
//! Binary payloads are carried as hex text in memory but written as Base64 of
//! the raw bytes; raw hex never reaches the disk.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use jerrycan_shared::{Direction, Message, MessageStatus, PeerId};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// ISO-8601, millisecond precision, UTC designator.
    pub time: String,
    pub direction: Direction,
    /// Base64 when `is_hex`, literal text otherwise.
    pub content: String,
    pub is_hex: bool,
}

impl Record {
    /// Transcode a message for persistence.
    ///
    /// Fails when a binary message does not carry valid hex, or when the
    /// timestamp falls outside years 0000-9999 and could not be parsed back.
    pub fn encode(message: &Message) -> Result<Self> {
        if !(0..=9999).contains(&message.timestamp.year()) {
            return Err(StoreError::TimestampOutOfRange(message.timestamp));
        }

        let content = if message.is_hex {
            BASE64.encode(hex::decode(normalize_hex(&message.content))?)
        } else {
            message.content.clone()
        };

        Ok(Self {
            time: format_time(&message.timestamp),
            direction: message.direction,
            content,
            is_hex: message.is_hex,
        })
    }

    /// Rebuild a message owned by `peer_id`.
    ///
    /// The producer's message id and delivery status are not persisted: a fresh
    /// id is generated and the status is always [`MessageStatus::Delivered`].
    pub fn decode(&self, peer_id: &PeerId) -> Result<Message> {
        let timestamp = DateTime::parse_from_rfc3339(&self.time)?.with_timezone(&Utc);

        let content = if self.is_hex {
            hex::encode_upper(BASE64.decode(self.content.as_bytes())?)
        } else {
            self.content.clone()
        };

        Ok(Message {
            id: Uuid::new_v4(),
            peer_id: peer_id.clone(),
            content,
            is_hex: self.is_hex,
            timestamp,
            direction: self.direction,
            status: MessageStatus::Delivered,
        })
    }

    /// Serialize as a single JSON line (no trailing newline).
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_line(line: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(line)?)
    }
}

/// Format a timestamp the way records store it.
pub fn format_time(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Drops whitespace and `0x` markers so "0xDE 0xAD" and "dead" decode alike.
fn normalize_hex(content: &str) -> String {
    let compact: String = content.split_whitespace().collect();
    compact.replace("0x", "").replace("0X", "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn peer() -> PeerId {
        PeerId::parse("AA:BB:CC:DD:EE:FF").unwrap()
    }

    fn at_millis(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_text_roundtrip() {
        let ts = at_millis(1_714_564_800_123);
        for text in ["Hello", "", "ünïcödé ✓ \"quoted\"\nsecond line", "{\"json\":true}"] {
            let msg = Message::text(peer(), text, Direction::Incoming).with_timestamp(ts);
            let record = Record::encode(&msg).unwrap();
            assert_eq!(record.content, text);

            let back = record.decode(&peer()).unwrap();
            assert_eq!(back.content, msg.content);
            assert_eq!(back.direction, Direction::Incoming);
            assert!(!back.is_hex);
            assert_eq!(back.timestamp, ts);
        }
    }

    #[test]
    fn test_binary_roundtrip_uppercases() {
        let msg = Message::binary(peer(), "deadBEEF00", Direction::Outgoing)
            .with_timestamp(at_millis(1_000));
        let record = Record::encode(&msg).unwrap();
        assert_eq!(record.content, BASE64.encode([0xdeu8, 0xad, 0xbe, 0xef, 0x00]));
        assert!(record.is_hex);

        let back = record.decode(&peer()).unwrap();
        assert_eq!(back.content, "DEADBEEF00");
        assert!(back.is_hex);
    }

    #[test]
    fn test_hex_markers_and_whitespace_stripped() {
        let msg = Message::binary(peer(), "0x01 0x02\t0X0a", Direction::Outgoing);
        let record = Record::encode(&msg).unwrap();
        assert_eq!(record.decode(&peer()).unwrap().content, "01020A");
    }

    #[test]
    fn test_invalid_hex_rejected() {
        let odd = Message::binary(peer(), "ABC", Direction::Outgoing);
        assert!(Record::encode(&odd).unwrap_err().is_decode());

        let junk = Message::binary(peer(), "zz", Direction::Outgoing);
        assert!(Record::encode(&junk).is_err());
    }

    #[test]
    fn test_unreadable_timestamp_rejected() {
        let far = Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).unwrap();
        let msg = Message::text(peer(), "later", Direction::Outgoing).with_timestamp(far);
        assert!(Record::encode(&msg).unwrap_err().is_decode());

        let edge = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        let msg = Message::text(peer(), "edge", Direction::Outgoing).with_timestamp(edge);
        let back = Record::encode(&msg).unwrap().decode(&peer()).unwrap();
        assert_eq!(back.timestamp, edge);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let record = Record {
            time: "2024-05-01T12:00:00.123Z".to_string(),
            direction: Direction::Incoming,
            content: "not base64!".to_string(),
            is_hex: true,
        };
        assert!(record.decode(&peer()).unwrap_err().is_decode());
    }

    #[test]
    fn test_status_and_id_not_preserved() {
        let msg = Message::text(peer(), "hi", Direction::Outgoing);
        let back = Record::encode(&msg).unwrap().decode(&peer()).unwrap();
        assert_eq!(back.status, MessageStatus::Delivered);
        assert_ne!(back.id, msg.id);
    }

    #[test]
    fn test_line_format() {
        let msg = Message::text(peer(), "Hello", Direction::Outgoing)
            .with_timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
                + chrono::Duration::milliseconds(123));
        let line = Record::encode(&msg).unwrap().to_line().unwrap();
        assert_eq!(
            line,
            r#"{"time":"2024-05-01T12:00:00.123Z","direction":"SEND","content":"Hello","isHex":false}"#
        );
        assert_eq!(
            Record::from_line(line.as_bytes()).unwrap(),
            Record::encode(&msg).unwrap()
        );
    }

    #[test]
    fn test_malformed_line_rejected() {
        assert!(Record::from_line(b"{\"time\":").unwrap_err().is_decode());
        assert!(Record::from_line(b"{\"time\":\"x\"}").is_err());
    }
}
