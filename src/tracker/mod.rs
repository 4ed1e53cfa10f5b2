//! Tracker module
//!
//! Peer discovery through HTTP trackers.

pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::peer::PeerAddress;
use crate::torrent::MetaInfo;

pub use http::{parse_announce_response, HttpTracker, DEFAULT_TRACKER_TIMEOUT};

/// Default port reported to trackers
pub const DEFAULT_PORT: u16 = 6881;

/// Parameters of one announce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

impl AnnounceRequest {
    /// Announce for a fresh download of the whole torrent
    pub fn new(meta: &MetaInfo, peer_id: [u8; 20], port: u16) -> Self {
        Self {
            info_hash: meta.info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left: meta.length,
        }
    }
}

/// Parsed announce reply
#[derive(Debug, Clone, Default)]
pub struct AnnounceResponse {
    /// Seconds the tracker wants between announces
    pub interval: Option<u64>,
    pub peers: Vec<PeerAddress>,
    pub warning: Option<String>,
}

/// Source of candidate peers for a torrent
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    async fn discover(&self, request: &AnnounceRequest) -> Result<Vec<PeerAddress>>;
}
