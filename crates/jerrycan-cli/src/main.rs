//! # jerrycan
//!
//! Maintenance CLI for the per-device message history kept by
//! `jerrycan-store`: list conversations, page through a history, record a
//! message, export and clear.

mod args;
mod commands;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jerrycan_store::{HistoryStore, StoreConfig};

use crate::args::Args;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "debug"
    } else {
        "info,jerrycan_store=debug"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = StoreConfig::from_env();
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(dir) = args.export_dir {
        config.export_dir = Some(dir);
    }
    let store = HistoryStore::from_config(config);

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(commands::run(&store, args.command));
    drop(runtime);

    // Anything still buffered goes to disk now that no scheduler is left.
    let persisted = store.ensure_persistence();
    if persisted > 0 {
        info!(count = persisted, "Flushed buffered messages on exit");
    }

    result
}
