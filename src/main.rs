//! bittorrent - Main entry point
//!
//! Command-line front end for the BitTorrent client core.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bittorrent_core::{
    bencode, AnnounceRequest, CancelToken, CliArgs, Command, Config, DownloadManager, FileBackend, HttpTracker,
    MetaInfo, PeerAddress, PeerConnection, PeerDiscovery, PeerSettings, StorageBackend, TorrentParser,
};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let cancel = CancelToken::new();
    watch_ctrl_c(cancel.clone());

    match &args.command {
        Command::Decode { value } => {
            let decoded = bencode::decode(value.as_encoded_bytes()).context("Failed to decode value")?;
            println!("{}", decoded.to_json());
        }
        Command::Info { torrent } => {
            let meta = load_torrent_file(torrent)?;
            display_torrent_info(&meta);
        }
        Command::Peers { torrent } => {
            let meta = load_torrent_file(torrent)?;
            let settings = config.peer_settings()?;
            for peer in discover_peers(&meta, &config, &settings).await? {
                println!("{}", peer);
            }
        }
        Command::Handshake { torrent, peer } => {
            let meta = load_torrent_file(torrent)?;
            let addr: PeerAddress = peer
                .parse()
                .with_context(|| format!("Invalid peer address '{}', expected <ip>:<port>", peer))?;
            let mut conn = PeerConnection::connect(addr, config.peer_settings()?)
                .await
                .with_context(|| format!("Failed to connect to {}", addr))?;
            let peer_id = conn
                .handshake(meta.info_hash)
                .await
                .with_context(|| format!("Handshake with {} failed", addr))?;
            println!("Peer ID: {}", hex::encode(peer_id));
        }
        Command::DownloadPiece { output, torrent, index } => {
            let meta = Arc::new(load_torrent_file(torrent)?);
            let settings = config.peer_settings()?;
            let peers = discover_peers(&meta, &config, &settings).await?;

            let mut manager = DownloadManager::new(meta.clone(), peers, settings).with_cancel_token(cancel);
            let data = manager
                .download_piece(*index)
                .await
                .with_context(|| format!("Failed to download piece {}", index))?;
            manager.close();

            let mut backend = FileBackend::new(output);
            backend.initialize(data.len() as u64).await?;
            backend.write_piece(*index, 0, data.into()).await?;
            backend.complete().await.context("Failed to write piece")?;
            println!("Piece {} downloaded to {}.", index, output.display());
        }
        Command::DownloadFile { output, torrent } => {
            let meta = Arc::new(load_torrent_file(torrent)?);
            let settings = config.peer_settings()?;
            let peers = discover_peers(&meta, &config, &settings).await?;

            let mut manager = DownloadManager::new(meta.clone(), peers, settings).with_cancel_token(cancel);
            let mut backend = FileBackend::new(output);
            manager
                .download_file(&mut backend)
                .await
                .with_context(|| format!("Failed to download {}", torrent.display()))?;

            let stats = manager.stats();
            info!(
                "{} pieces, {} bytes, {} failed attempts, {} connections",
                stats.pieces_verified, stats.downloaded_bytes, stats.failed_attempts, stats.connections
            );
            println!("Downloaded {} to {}.", torrent.display(), output.display());
        }
    }

    Ok(())
}

/// Initialize logging based on verbosity settings
///
/// Logs go to stderr so stdout carries only command output.
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.verbose {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
    debug!("Logging initialized at {:?}", args.log_level());
}

/// Cancel in-flight downloads on Ctrl-C
fn watch_ctrl_c(cancel: CancelToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, stopping after the current block");
                cancel.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

/// Load and parse the torrent file
fn load_torrent_file(path: &Path) -> Result<MetaInfo> {
    info!("Loading torrent file: {}", path.display());
    let meta = TorrentParser::parse_file(path)
        .with_context(|| format!("Failed to load torrent file {}", path.display()))?;
    debug!("Loaded torrent with {} pieces, info hash {}", meta.piece_count(), meta.info_hash_hex());
    Ok(meta)
}

fn display_torrent_info(meta: &MetaInfo) {
    println!("Tracker URL: {}", meta.announce);
    println!("Length: {}", meta.length);
    println!("Info Hash: {}", meta.info_hash_hex());
    println!("Piece Length: {}", meta.piece_length);
    println!("Piece Hashes:");
    for hash in meta.piece_hashes_hex() {
        println!("{}", hash);
    }
}

async fn discover_peers(meta: &MetaInfo, config: &Config, settings: &PeerSettings) -> Result<Vec<PeerAddress>> {
    let tracker = HttpTracker::new(&meta.announce, config.tracker_timeout()).context("Invalid tracker URL")?;
    let request = AnnounceRequest::new(meta, settings.peer_id, config.port);
    let peers = tracker.discover(&request).await.context("Tracker request failed")?;
    if peers.is_empty() {
        warn!("Tracker returned no peers");
    }
    Ok(peers)
}
