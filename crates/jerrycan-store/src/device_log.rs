//! Per-peer append-only history file.
//!
//! One file per peer at `<history dir>/<file stem>.log`, one [`Record`] per
//! line. There is no header, index or tombstone: deleting a peer's history
//! deletes the file.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use jerrycan_shared::PeerId;

use crate::error::Result;
use crate::record::Record;

/// File extension of history logs.
pub const LOG_EXTENSION: &str = "log";

#[derive(Debug, Clone)]
pub struct DeviceLog {
    peer_id: PeerId,
    path: PathBuf,
    sync_writes: bool,
}

impl DeviceLog {
    pub fn new(history_dir: &Path, peer_id: &PeerId) -> Self {
        Self {
            peer_id: peer_id.clone(),
            path: history_dir.join(file_name_for(peer_id)),
            sync_writes: false,
        }
    }

    /// Call `fsync` after each append.
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Append records, one JSON object per line.
    ///
    /// The whole batch is assembled first and written with a single
    /// `write_all` on a file opened in append mode, so lines from two appends
    /// never interleave and existing content is never truncated.
    pub fn append(&self, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut buf = String::new();
        for record in records {
            buf.push_str(&record.to_line()?);
            buf.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.flush()?;
        if self.sync_writes {
            file.sync_data()?;
        }

        debug!(peer = %self.peer_id, count = records.len(), "Appended records");
        Ok(records.len())
    }

    /// Read every well-formed record in file order.
    ///
    /// A missing file is an empty history. Lines that fail to parse, including
    /// lines that are not valid UTF-8, are logged and skipped.
    pub fn read_all(&self) -> Result<Vec<Record>> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut records = Vec::new();
        for (index, line) in reader.split(b'\n').enumerate() {
            let line = line?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match Record::from_line(&line) {
                Ok(record) => records.push(record),
                Err(e) if e.is_decode() => {
                    warn!(
                        peer = %self.peer_id,
                        line = index + 1,
                        error = %e,
                        "Skipping malformed history line"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    /// Remove the file. Returns `true` when no file remains, including when
    /// there was none to begin with.
    pub fn delete(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(true);
        }
        fs::remove_file(&self.path)?;
        debug!(peer = %self.peer_id, "Deleted history log");
        Ok(true)
    }
}

/// `AA:BB:CC` -> `AA_BB_CC.log`
pub fn file_name_for(peer_id: &PeerId) -> String {
    format!("{}.{}", peer_id.file_stem(), LOG_EXTENSION)
}

/// Inverse of [`file_name_for`]. `None` for anything that is not a history log.
pub fn peer_id_from(file_name: &str) -> Option<PeerId> {
    let stem = file_name.strip_suffix(&format!(".{LOG_EXTENSION}"))?;
    PeerId::from_file_stem(stem).ok()
}

/// Peers that have a history log in `history_dir`, sorted.
pub fn list_peers(history_dir: &Path) -> Result<Vec<PeerId>> {
    if !history_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut peers = Vec::new();
    for entry in fs::read_dir(history_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(peer) = entry.file_name().to_str().and_then(peer_id_from) {
            peers.push(peer);
        }
    }
    peers.sort();
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jerrycan_shared::Direction;
    use tempfile::TempDir;

    fn peer() -> PeerId {
        PeerId::parse("AA:BB:CC:DD:EE:FF").unwrap()
    }

    fn record(time: &str, content: &str) -> Record {
        Record {
            time: time.to_string(),
            direction: Direction::Outgoing,
            content: content.to_string(),
            is_hex: false,
        }
    }

    #[test]
    fn test_file_name_roundtrip() {
        assert_eq!(file_name_for(&peer()), "AA_BB_CC_DD_EE_FF.log");
        assert_eq!(peer_id_from("AA_BB_CC_DD_EE_FF.log"), Some(peer()));
        assert_eq!(peer_id_from("AA_BB_CC_DD_EE_FF.txt"), None);
        assert_eq!(peer_id_from("bad name.log"), None);
    }

    #[test]
    fn test_append_creates_dirs_and_appends() {
        let dir = TempDir::new().unwrap();
        let log = DeviceLog::new(&dir.path().join("nested").join("history"), &peer());
        assert!(!log.exists());

        log.append(&[record("2024-05-01T12:00:00.001Z", "one")]).unwrap();
        log.append(&[
            record("2024-05-01T12:00:00.002Z", "two"),
            record("2024-05-01T12:00:00.003Z", "three"),
        ])
        .unwrap();

        let contents: Vec<_> = log
            .read_all()
            .unwrap()
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(contents, ["one", "two", "three"]);

        let raw = fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 3);
        assert!(raw.ends_with('\n'));
    }

    #[test]
    fn test_empty_append_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let log = DeviceLog::new(dir.path(), &peer());
        assert_eq!(log.append(&[]).unwrap(), 0);
        assert!(!log.exists());
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let log = DeviceLog::new(dir.path(), &peer());
        log.append(&[record("2024-05-01T12:00:00.001Z", "good")]).unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(b"{not json\n\n").unwrap();
        file.write_all(&[0xff, 0xfe, b'\n']).unwrap();
        drop(file);
        log.append(&[record("2024-05-01T12:00:00.002Z", "also good")]).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].content, "also good");
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = DeviceLog::new(dir.path(), &peer());
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let log = DeviceLog::new(dir.path(), &peer());
        log.append(&[record("2024-05-01T12:00:00.001Z", "x")]).unwrap();

        assert!(log.delete().unwrap());
        assert!(!log.exists());
        assert!(log.delete().unwrap());
    }

    #[test]
    fn test_list_peers_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        let other = PeerId::parse("11:22:33").unwrap();
        DeviceLog::new(dir.path(), &peer())
            .append(&[record("2024-05-01T12:00:00.001Z", "a")])
            .unwrap();
        DeviceLog::new(dir.path(), &other)
            .append(&[record("2024-05-01T12:00:00.001Z", "b")])
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("sub.log")).unwrap();

        assert_eq!(list_peers(dir.path()).unwrap(), vec![other, peer()]);
        assert!(list_peers(&dir.path().join("missing")).unwrap().is_empty());
    }
}
