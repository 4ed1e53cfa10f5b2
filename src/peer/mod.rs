//! Peer module
//!
//! Peer addresses, the session state machine and the connection engine.

pub mod connection;
pub mod state;

// Re-export main types
pub use connection::{CancelToken, PeerConnection, PeerSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
pub use state::{ConnectionState, PeerAddress, COMPACT_PEER_LENGTH};
