//! Peer connection module
//!
//! Drives one session with a remote peer: handshake, the
//! bitfield/interested/unchoke exchange and pipelined block retrieval.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, TorrentError};
use crate::peer::{ConnectionState, PeerAddress};
use crate::protocol::{BitTorrentWire, Handshake, Message, WireProtocol};
use crate::storage::piece::{block_layout, PieceBuffer};

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-message read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings handed to every peer session
#[derive(Debug, Clone)]
pub struct PeerSettings {
    /// Our peer id, sent in every handshake
    pub peer_id: [u8; 20],
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Maximum outstanding block requests (1 means strictly sequential)
    pub pipeline_depth: usize,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            peer_id: Handshake::generate_peer_id(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            pipeline_depth: 1,
        }
    }
}

/// Shared cancellation flag checked between blocks and peer attempts
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        info!("Cancellation requested");
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` once the token has fired
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(TorrentError::Cancelled);
        }
        Ok(())
    }
}

/// Represents a session with one peer over any async byte stream
pub struct PeerConnection<S = TcpStream> {
    /// Peer label used in logs and errors
    peer: String,
    stream: S,
    wire: BitTorrentWire,
    settings: PeerSettings,
    state: ConnectionState,
    remote_peer_id: Option<[u8; 20]>,
    bitfield: Option<Vec<u8>>,
}

impl PeerConnection<TcpStream> {
    /// Open a TCP connection to a peer within the connect timeout
    pub async fn connect(addr: PeerAddress, settings: PeerSettings) -> Result<Self> {
        info!("Connecting to peer: {}", addr);

        let stream = match timeout(settings.connect_timeout, TcpStream::connect(addr.socket_addr())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", addr, e);
                return Err(TorrentError::connection_lost(addr.to_string(), e.to_string()));
            }
            Err(_) => {
                warn!("Connection timeout to {}", addr);
                return Err(TorrentError::connection_lost(addr.to_string(), "connect timed out"));
            }
        };

        debug!("Connected to peer: {}", addr);
        Ok(Self::new(stream, addr.to_string(), settings))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PeerConnection<S> {
    /// Wrap an already connected stream
    pub fn new(stream: S, peer: impl Into<String>, settings: PeerSettings) -> Self {
        Self {
            peer: peer.into(),
            stream,
            wire: BitTorrentWire::new(),
            settings,
            state: ConnectionState::Connected,
            remote_peer_id: None,
            bitfield: None,
        }
    }

    /// Exchange handshakes and return the remote peer id
    pub async fn handshake(&mut self, info_hash: [u8; 20]) -> Result<[u8; 20]> {
        self.expect_state(ConnectionState::Connected, "handshake")?;
        info!("Performing handshake with peer: {}", self.peer);

        let ours = Handshake::new(info_hash, self.settings.peer_id);
        if let Err(e) = self.wire.write_handshake(&mut self.stream, &ours).await {
            return Err(self.fail(e));
        }

        let read = timeout(self.settings.read_timeout, self.wire.read_handshake(&mut self.stream)).await;
        let theirs = match read {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(e)) => return Err(self.fail(e)),
            Err(_) => return Err(self.fail(TorrentError::connection_lost("unknown", "handshake timed out"))),
        };

        if let Err(e) = theirs.validate(&info_hash) {
            return Err(self.fail(e));
        }

        self.remote_peer_id = Some(theirs.peer_id);
        self.state = ConnectionState::Handshaked;
        debug!("Handshake completed with {}: peer id {}", self.peer, hex::encode(theirs.peer_id));
        Ok(theirs.peer_id)
    }

    /// Await the bitfield, declare interest and wait to be unchoked
    pub async fn prepare_download(&mut self) -> Result<()> {
        self.expect_state(ConnectionState::Handshaked, "prepare_download")?;

        self.state = ConnectionState::AwaitingBitfield;
        match self.next_message().await? {
            Message::Bitfield { bitfield } => {
                debug!("Peer {} has {} pieces", self.peer, bitfield.iter().map(|b| b.count_ones()).sum::<u32>());
                self.bitfield = Some(bitfield);
            }
            other => return Err(self.unexpected(&other, "bitfield")),
        }

        self.send(&Message::Interested).await?;
        self.state = ConnectionState::Interested;

        match self.next_message().await? {
            Message::Unchoke => {}
            other => return Err(self.unexpected(&other, "unchoke")),
        }

        self.state = ConnectionState::Unchoked;
        debug!("Peer {} unchoked us", self.peer);
        Ok(())
    }

    /// Request every block of a piece and assemble the responses
    ///
    /// Up to `pipeline_depth` requests are kept outstanding. Responses are
    /// matched to requests by `(index, begin)` so they may arrive in any
    /// order. The returned buffer has not been hash-checked yet.
    pub async fn download_piece(&mut self, index: u32, length: u32, cancel: &CancelToken) -> Result<PieceBuffer> {
        if !self.state.can_request() {
            return Err(self.fail(TorrentError::protocol_violation(format!(
                "download_piece called in state {:?}",
                self.state
            ))));
        }

        let blocks = block_layout(length);
        let depth = self.settings.pipeline_depth.max(1);
        let mut buffer = PieceBuffer::new(index, length);
        let mut pending: HashMap<(u32, u32), u32> = HashMap::new();
        let mut next = 0;

        info!("Downloading piece {} ({} bytes, {} blocks) from {}", index, length, blocks.len(), self.peer);

        while next < blocks.len() || !pending.is_empty() {
            if let Err(e) = cancel.check() {
                self.state = ConnectionState::Failed;
                return Err(e);
            }

            while next < blocks.len() && pending.len() < depth {
                let (begin, block_length) = blocks[next];
                trace!("Requesting piece {} block {} ({} bytes) from {}", index, begin, block_length, self.peer);
                self.send(&Message::Request { index, begin, length: block_length }).await?;
                pending.insert((index, begin), block_length);
                next += 1;
            }
            self.state = ConnectionState::Requesting;

            match self.next_message().await? {
                Message::Piece { index: got, begin, block } => {
                    let Some(requested) = pending.remove(&(got, begin)) else {
                        return Err(self.fail(TorrentError::protocol_violation(format!(
                            "unrequested block: piece {} offset {}",
                            got, begin
                        ))));
                    };
                    if block.len() != requested as usize {
                        return Err(self.fail(TorrentError::protocol_violation(format!(
                            "block at piece {} offset {} has {} bytes, requested {}",
                            got,
                            begin,
                            block.len(),
                            requested
                        ))));
                    }
                    if let Err(e) = buffer.write_block(begin, &block) {
                        return Err(self.fail(e));
                    }
                }
                Message::Have { piece_index } => {
                    trace!("Peer {} now has piece {}", self.peer, piece_index);
                    self.mark_piece(piece_index);
                }
                ignored @ (Message::Unchoke | Message::Interested | Message::NotInterested) => {
                    trace!("Ignoring {:?} from {} mid-piece", ignored.message_id(), self.peer);
                }
                Message::Choke => {
                    return Err(self.fail(TorrentError::protocol_violation("peer choked us mid-piece")));
                }
                other => return Err(self.unexpected(&other, "piece")),
            }
        }

        self.state = ConnectionState::Complete;
        debug!("Piece {} assembled from {}", index, self.peer);
        Ok(buffer)
    }

    /// Whether the peer's bitfield advertises a piece
    pub fn has_piece(&self, index: u32) -> bool {
        let Some(bitfield) = &self.bitfield else {
            return false;
        };
        let byte = index as usize / 8;
        let bit = 7 - (index % 8);
        bitfield.get(byte).is_some_and(|b| (b >> bit) & 1 == 1)
    }

    /// Indices past the advertised bitfield are ignored
    fn mark_piece(&mut self, index: u32) {
        let byte = index as usize / 8;
        if let Some(b) = self.bitfield.as_mut().and_then(|bitfield| bitfield.get_mut(byte)) {
            *b |= 1 << (7 - (index % 8));
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn remote_peer_id(&self) -> Option<[u8; 20]> {
        self.remote_peer_id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    async fn send(&mut self, message: &Message) -> Result<()> {
        debug!("Sending {:?} message to peer: {}", message.message_id(), self.peer);
        if let Err(e) = self.wire.write_message(&mut self.stream, message).await {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Next non-keep-alive message, within the read timeout
    async fn next_message(&mut self) -> Result<Message> {
        loop {
            let read = timeout(self.settings.read_timeout, self.wire.read_message(&mut self.stream)).await;
            let message = match read {
                Ok(Ok(message)) => message,
                Ok(Err(e)) => return Err(self.fail(e)),
                Err(_) => {
                    warn!("Receive message timeout from peer: {}", self.peer);
                    return Err(self.fail(TorrentError::connection_lost("unknown", "read timed out")));
                }
            };

            if message == Message::KeepAlive {
                trace!("Skipping keep-alive from {}", self.peer);
                continue;
            }
            debug!("Received {:?} message from peer: {}", message.message_id(), self.peer);
            return Ok(message);
        }
    }

    fn expect_state(&mut self, expected: ConnectionState, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(self.fail(TorrentError::protocol_violation(format!(
                "{} called in state {:?}",
                operation, self.state
            ))));
        }
        Ok(())
    }

    fn unexpected(&mut self, message: &Message, awaited: &str) -> TorrentError {
        error!("Expected {} from {}, got {:?}", awaited, self.peer, message.message_id());
        self.fail(TorrentError::protocol_violation(format!(
            "expected {}, got {:?}",
            awaited,
            message.message_id()
        )))
    }

    fn fail(&mut self, err: TorrentError) -> TorrentError {
        self.state = ConnectionState::Failed;
        err.with_peer(self.peer.clone())
    }
}
