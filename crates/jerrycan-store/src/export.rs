//! Human-readable copies of a peer's history.
//!
//! An export is the same JSON Lines body as the history log, preceded by
//! three `#` comment lines:
//!
//! ```text
//! # Peer: AA:BB:CC:DD:EE:FF
//! # Exported: 2024-05-01T12:00:00.123Z
//! # Messages: 2
//! {"time":...}
//! {"time":...}
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use jerrycan_shared::PeerId;

use crate::error::Result;
use crate::record::{format_time, Record};

const EXPORT_PREFIX: &str = "Export_";

/// `<export dir>/Export_<file stem>.log`
pub fn export_path(export_dir: &Path, peer_id: &PeerId) -> PathBuf {
    export_dir.join(format!(
        "{EXPORT_PREFIX}{}",
        crate::device_log::file_name_for(peer_id)
    ))
}

/// Render the export document.
pub fn render_export(
    peer_id: &PeerId,
    exported_at: &DateTime<Utc>,
    records: &[Record],
) -> Result<String> {
    let mut out = String::new();
    out.push_str(&format!("# Peer: {peer_id}\n"));
    out.push_str(&format!("# Exported: {}\n", format_time(exported_at)));
    out.push_str(&format!("# Messages: {}\n", records.len()));
    for record in records {
        out.push_str(&record.to_line()?);
        out.push('\n');
    }
    Ok(out)
}

/// Write an export, replacing any previous export of the same peer.
pub fn write_export(export_dir: &Path, peer_id: &PeerId, records: &[Record]) -> Result<PathBuf> {
    let body = render_export(peer_id, &Utc::now(), records)?;
    fs::create_dir_all(export_dir)?;
    let path = export_path(export_dir, peer_id);
    fs::write(&path, body)?;
    Ok(path)
}
