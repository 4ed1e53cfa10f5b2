//! Peer state module
//!
//! Defines peer addresses and the session state machine.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Result, TorrentError};

/// Size of one entry in a compact peer list
pub const COMPACT_PEER_LENGTH: usize = 6;

/// Represents the state of a peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// TCP stream established, nothing exchanged yet
    #[default]
    Connected,
    /// Handshakes exchanged and validated
    Handshaked,
    /// Waiting for the peer's bitfield
    AwaitingBitfield,
    /// Bitfield received and `interested` sent
    Interested,
    /// Peer unchoked us; requests may be sent
    Unchoked,
    /// Block requests are outstanding
    Requesting,
    /// Last piece was assembled
    Complete,
    /// Session is unusable
    Failed,
}

impl ConnectionState {
    /// Whether block requests may be issued in this state
    pub fn can_request(&self) -> bool {
        matches!(self, ConnectionState::Unchoked | ConnectionState::Complete)
    }
}

/// IPv4 address and port of a remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse one 6-byte compact entry (4 bytes IP, 2 bytes port, network order)
    pub fn from_compact(entry: &[u8]) -> Result<Self> {
        if entry.len() != COMPACT_PEER_LENGTH {
            return Err(TorrentError::tracker_error(format!(
                "compact peer entry must be {} bytes, got {}",
                COMPACT_PEER_LENGTH,
                entry.len()
            )));
        }
        let ip = Ipv4Addr::new(entry[0], entry[1], entry[2], entry[3]);
        let port = u16::from_be_bytes([entry[4], entry[5]]);
        trace!("Parsed compact peer {}:{}", ip, port);
        Ok(Self { ip, port })
    }

    /// Parse a whole compact peer list
    pub fn parse_compact_list(data: &[u8]) -> Result<Vec<Self>> {
        if data.len() % COMPACT_PEER_LENGTH != 0 {
            return Err(TorrentError::tracker_error(format!(
                "compact peer list length {} is not a multiple of {}",
                data.len(),
                COMPACT_PEER_LENGTH
            )));
        }
        let peers = data
            .chunks_exact(COMPACT_PEER_LENGTH)
            .map(Self::from_compact)
            .collect::<Result<Vec<_>>>()?;
        debug!("Parsed {} peers from compact list", peers.len());
        Ok(peers)
    }

    /// Encode back to the 6-byte compact form
    pub fn to_compact(&self) -> [u8; COMPACT_PEER_LENGTH] {
        let mut entry = [0u8; COMPACT_PEER_LENGTH];
        entry[..4].copy_from_slice(&self.ip.octets());
        entry[4..].copy_from_slice(&self.port.to_be_bytes());
        entry
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = TorrentError;

    fn from_str(s: &str) -> Result<Self> {
        let addr: SocketAddrV4 = s.parse()?;
        Ok(Self::new(*addr.ip(), addr.port()))
    }
}

impl From<SocketAddrV4> for PeerAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<PeerAddress> for SocketAddr {
    fn from(addr: PeerAddress) -> Self {
        addr.socket_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_compact() {
        let peer = PeerAddress::from_compact(&[192, 168, 1, 10, 0x1a, 0xe1]).unwrap();
        assert_eq!(peer.ip, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(peer.port, 6881);
        assert_eq!(peer.to_string(), "192.168.1.10:6881");
    }

    #[test]
    fn test_parse_compact_list() {
        let data = [127, 0, 0, 1, 0x1a, 0xe1, 10, 0, 0, 2, 0x00, 0x50];
        let peers = PeerAddress::parse_compact_list(&data).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].to_string(), "127.0.0.1:6881");
        assert_eq!(peers[1].to_string(), "10.0.0.2:80");
    }

    #[test]
    fn test_compact_list_bad_length() {
        assert!(matches!(
            PeerAddress::parse_compact_list(&[1, 2, 3, 4, 5, 6, 7]),
            Err(TorrentError::Tracker { .. })
        ));
        assert!(PeerAddress::parse_compact_list(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_compact_encoding_matches_parse() {
        let peer = PeerAddress::new(Ipv4Addr::new(8, 8, 4, 4), 51413);
        assert_eq!(PeerAddress::from_compact(&peer.to_compact()).unwrap(), peer);
    }

    #[test]
    fn test_from_str() {
        let peer: PeerAddress = "165.232.33.77:51467".parse().unwrap();
        assert_eq!(peer.port, 51467);
        assert_eq!(peer.socket_addr().to_string(), "165.232.33.77:51467");

        assert!(matches!(
            "not-an-address".parse::<PeerAddress>(),
            Err(TorrentError::Config { .. })
        ));
    }

    #[test]
    fn test_connection_state() {
        assert_eq!(ConnectionState::default(), ConnectionState::Connected);
        assert!(!ConnectionState::Interested.can_request());
        assert!(ConnectionState::Unchoked.can_request());
        assert!(ConnectionState::Complete.can_request());
        assert!(!ConnectionState::Failed.can_request());
    }
}
