//! bittorrent-core
//!
//! A BitTorrent client core: bencode codec, torrent metadata with
//! info-hash derivation, an HTTP tracker client and the peer wire protocol
//! engine that downloads and verifies pieces.

pub mod bencode;
pub mod cli;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod torrent;
pub mod tracker;

pub use error::{BencodeError, Result, TorrentError};

pub use bencode::Value;
pub use cli::{CliArgs, Command, Config};
pub use peer::{CancelToken, ConnectionState, PeerAddress, PeerConnection, PeerSettings};
pub use protocol::{BitTorrentWire, Handshake, Message, MessageId, WireProtocol};
pub use storage::{
    block_layout, verify_piece, DownloadManager, DownloadStats, FileBackend, MemoryBackend, PieceBuffer,
    StorageBackend, StorageType, BLOCK_SIZE,
};
pub use torrent::{MetaInfo, TorrentParser};
pub use tracker::{AnnounceRequest, AnnounceResponse, HttpTracker, PeerDiscovery};
