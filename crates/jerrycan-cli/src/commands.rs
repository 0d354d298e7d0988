use anyhow::{bail, Context};

use jerrycan_shared::{Direction, Message, PeerId};
use jerrycan_store::record::format_time;
use jerrycan_store::{HistoryStore, Record};

use crate::args::Command;

pub async fn run(store: &HistoryStore, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Peers => list_peers(store).await,
        Command::Show {
            peer,
            offset,
            limit,
        } => show(store, &parse_peer(&peer)?, offset, limit).await,
        Command::Append {
            peer,
            content,
            hex,
            incoming,
        } => append(store, parse_peer(&peer)?, content, hex, incoming).await,
        Command::Export { peer, all } => export(store, peer.as_deref(), all).await,
        Command::Clear { peer } => clear(store, &parse_peer(&peer)?).await,
    }
}

fn parse_peer(s: &str) -> anyhow::Result<PeerId> {
    PeerId::parse(s).with_context(|| format!("invalid peer id {s:?}"))
}

async fn list_peers(store: &HistoryStore) -> anyhow::Result<()> {
    let mut last: Vec<_> = store.all_last_messages().await.into_iter().collect();
    last.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));

    if last.is_empty() {
        println!("No message history.");
    }
    for (peer, message) in last {
        println!("{peer}  {}", render(&message));
    }
    Ok(())
}

async fn show(store: &HistoryStore, peer: &PeerId, offset: usize, limit: usize) -> anyhow::Result<()> {
    let page = store.load_paged(peer, offset, limit).await;
    if page.is_empty() {
        println!("No messages for {peer} at offset {offset}.");
    }
    for message in &page {
        println!("{}", render(message));
    }
    Ok(())
}

async fn append(
    store: &HistoryStore,
    peer: PeerId,
    content: String,
    hex: bool,
    incoming: bool,
) -> anyhow::Result<()> {
    let direction = Direction::from_incoming(incoming);
    let message = if hex {
        Message::binary(peer.clone(), content, direction)
    } else {
        Message::text(peer.clone(), content, direction)
    };
    Record::encode(&message).context("invalid hex payload")?;
    store.save(message).await;
    println!("Recorded message for {peer}.");
    Ok(())
}

async fn export(store: &HistoryStore, peer: Option<&str>, all: bool) -> anyhow::Result<()> {
    if all {
        let paths = store.export_all().await;
        for path in &paths {
            println!("{}", path.display());
        }
        println!("Exported {} histories.", paths.len());
        return Ok(());
    }

    let Some(peer) = peer else {
        bail!("a peer id or --all is required");
    };
    let peer = parse_peer(peer)?;
    match store.export(&peer).await {
        Some(path) => println!("{}", path.display()),
        None => bail!("nothing exported for {peer}"),
    }
    Ok(())
}

async fn clear(store: &HistoryStore, peer: &PeerId) -> anyhow::Result<()> {
    if !store.clear(peer).await {
        bail!("could not delete history for {peer}");
    }
    println!("Cleared history for {peer}.");
    Ok(())
}

fn render(message: &Message) -> String {
    let arrow = if message.is_incoming() { "<" } else { ">" };
    let content = if message.is_hex {
        format!("[hex] {}", message.content)
    } else {
        message.content.clone()
    };
    format!("{}  {arrow}  {content}", format_time(&message.timestamp))
}
