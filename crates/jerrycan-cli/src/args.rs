//! Command-line argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and maintain JerryCan message history
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Storage root (overrides JERRYCAN_DATA_DIR and the platform default)
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Export root (overrides JERRYCAN_EXPORT_DIR; defaults to the storage root)
    #[arg(short, long)]
    pub export_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every peer with its most recent message
    Peers,

    /// Print a page of a peer's history, oldest first
    Show {
        /// Peer id, e.g. AA:BB:CC:DD:EE:FF
        peer: String,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Record a message in a peer's history
    Append {
        peer: String,

        content: String,

        /// Content is a hex-encoded binary payload
        #[arg(long, default_value = "false")]
        hex: bool,

        /// Message was received from the peer rather than sent
        #[arg(long, default_value = "false")]
        incoming: bool,
    },

    /// Export one peer's history, or every peer's with --all
    Export {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        peer: Option<String>,

        #[arg(long, default_value = "false")]
        all: bool,
    },

    /// Delete a peer's history
    Clear { peer: String },
}
