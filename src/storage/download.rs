//! Download manager module
//!
//! Fetches pieces one at a time, trying peers in order until one delivers
//! a piece that verifies, and writes verified pieces through a storage
//! backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TorrentError};
use crate::peer::{CancelToken, PeerAddress, PeerConnection, PeerSettings};
use crate::storage::backend::StorageBackend;
use crate::torrent::MetaInfo;

/// Download statistics
#[derive(Debug, Clone, Default)]
pub struct DownloadStats {
    /// Total verified bytes downloaded
    pub downloaded_bytes: u64,
    /// Pieces downloaded and verified
    pub pieces_verified: usize,
    /// Pieces that failed hash verification
    pub pieces_failed: usize,
    /// Peer attempts abandoned after a recoverable error
    pub failed_attempts: usize,
    /// Sessions opened
    pub connections: usize,
    /// Time spent downloading
    pub elapsed: Duration,
}

impl DownloadStats {
    /// Average download speed in bytes per second
    pub fn download_speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.downloaded_bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Sequential downloader for a single-file torrent
pub struct DownloadManager {
    meta: Arc<MetaInfo>,
    peers: Vec<PeerAddress>,
    settings: PeerSettings,
    cancel: CancelToken,
    /// Live session and the index of its peer in `peers`
    session: Option<(usize, PeerConnection)>,
    stats: DownloadStats,
}

impl DownloadManager {
    /// Create a new download manager
    pub fn new(meta: Arc<MetaInfo>, peers: Vec<PeerAddress>, settings: PeerSettings) -> Self {
        info!("Creating download manager with {} candidate peers", peers.len());
        Self {
            meta,
            peers,
            settings,
            cancel: CancelToken::new(),
            session: None,
            stats: DownloadStats::default(),
        }
    }

    /// Use a caller-owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    pub fn peers(&self) -> &[PeerAddress] {
        &self.peers
    }

    /// Download and verify one piece, trying each peer in turn
    pub async fn download_piece(&mut self, index: u32) -> Result<Vec<u8>> {
        self.cancel.check()?;
        let length = self.meta.piece_len(index)?;
        let expected = self.meta.piece_hash(index).ok_or_else(|| {
            TorrentError::invalid_field("piece index", format!("no hash for piece {}", index))
        })?;
        let started = Instant::now();

        for peer_index in 0..self.peers.len() {
            self.cancel.check()?;
            let peer = self.peers[peer_index];

            match self.try_peer(peer_index, index, length, &expected).await {
                Ok(data) => {
                    self.stats.pieces_verified += 1;
                    self.stats.downloaded_bytes += data.len() as u64;
                    self.stats.elapsed += started.elapsed();
                    info!("Piece {} verified ({} bytes from {})", index, data.len(), peer);
                    return Ok(data);
                }
                Err(e) if e.is_recoverable() => {
                    if matches!(e, TorrentError::HashMismatch { .. }) {
                        self.stats.pieces_failed += 1;
                    }
                    self.stats.failed_attempts += 1;
                    warn!("Piece {} failed with peer {}: {}", index, peer, e);
                    self.session = None;
                }
                Err(e) => {
                    error!("Piece {} aborted: {}", index, e);
                    self.session = None;
                    self.stats.elapsed += started.elapsed();
                    return Err(e);
                }
            }
        }

        self.stats.elapsed += started.elapsed();
        error!("All {} peers failed for piece {}", self.peers.len(), index);
        Err(TorrentError::PeersExhausted { piece: index })
    }

    /// Download every piece in ascending order into `backend`
    pub async fn download_file(&mut self, backend: &mut dyn StorageBackend) -> Result<()> {
        let expected_count = self.meta.expected_piece_count();
        if expected_count != self.meta.piece_count() as u64 {
            return Err(TorrentError::invalid_field(
                "pieces",
                format!(
                    "{} hashes listed but {} bytes at piece length {} need {}",
                    self.meta.piece_count(),
                    self.meta.length,
                    self.meta.piece_length,
                    expected_count
                ),
            ));
        }

        let piece_count = self.meta.piece_count() as u32;
        info!(
            "Starting download: {} bytes in {} pieces to {:?} storage",
            self.meta.length,
            piece_count,
            backend.storage_type()
        );
        backend.initialize(self.meta.length).await?;

        for index in 0..piece_count {
            self.cancel.check()?;
            let data = self.download_piece(index).await?;
            let offset = self.meta.piece_offset(index)?;
            backend.write_piece(index, offset, Bytes::from(data)).await?;
            debug!("Progress: {}/{} pieces", index + 1, piece_count);
        }

        backend.complete().await?;
        self.close();
        info!(
            "Download complete: {} bytes, {} failed attempts, {:.0} B/s",
            self.stats.downloaded_bytes,
            self.stats.failed_attempts,
            self.stats.download_speed()
        );
        Ok(())
    }

    /// Drop the live session, if any
    pub fn close(&mut self) {
        if let Some((_, conn)) = self.session.take() {
            debug!("Closing session with {}", conn.peer());
        }
    }

    async fn try_peer(&mut self, peer_index: usize, index: u32, length: u32, expected: &[u8; 20]) -> Result<Vec<u8>> {
        let cancel = self.cancel.clone();
        let conn = self.session_for(peer_index).await?;
        if !conn.has_piece(index) {
            return Err(TorrentError::protocol_violation_with_peer(
                format!("bitfield does not advertise piece {}", index),
                conn.peer(),
            ));
        }
        let buffer = conn.download_piece(index, length, &cancel).await?;
        buffer.verify(expected)
    }

    /// Reuse the live session when it belongs to this peer, otherwise open one
    async fn session_for(&mut self, peer_index: usize) -> Result<&mut PeerConnection> {
        let reusable = matches!(
            &self.session,
            Some((i, conn)) if *i == peer_index && conn.state().can_request()
        );

        if !reusable {
            self.close();
            let addr = self.peers[peer_index];
            let mut conn = PeerConnection::connect(addr, self.settings.clone()).await?;
            self.stats.connections += 1;
            conn.handshake(self.meta.info_hash).await?;
            conn.prepare_download().await?;
            self.session = Some((peer_index, conn));
        } else {
            debug!("Reusing session with {}", self.peers[peer_index]);
        }

        let label = self.peers[peer_index].to_string();
        self.session
            .as_mut()
            .map(|(_, conn)| conn)
            .ok_or_else(|| TorrentError::connection_lost(label, "no session"))
    }
}
