//! Error types for the BitTorrent client core
//!
//! This module defines the error taxonomy shared by the codec, the
//! metadata extractor, the peer engine and the download orchestrator.

use std::fmt;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, TorrentError>;

/// Bencode decoding failures, each tagged with the byte offset where it occurred
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeError {
    /// Byte string length prefix is missing its `:` or is not a number
    MalformedLength { position: usize },
    /// Integer has no digits, stray characters, leading zeros or `-0`
    MalformedInteger { position: usize },
    /// Buffer ended before a list's closing `e`
    UnterminatedList { position: usize },
    /// Buffer ended before a dictionary's closing `e`
    UnterminatedDict { position: usize },
    /// Dictionary key was not a byte string
    NonStringKey { position: usize },
    /// Leading byte does not start any bencode value
    UnsupportedTag { position: usize, tag: u8 },
    /// Buffer ended in the middle of a value
    UnexpectedEof { position: usize },
    /// Bytes remain after a complete top-level value
    TrailingData { position: usize },
    /// Lists/dicts nested beyond the supported depth
    NestingTooDeep { position: usize },
}

impl BencodeError {
    /// Byte offset in the input where decoding failed
    pub fn position(&self) -> usize {
        match self {
            BencodeError::MalformedLength { position }
            | BencodeError::MalformedInteger { position }
            | BencodeError::UnterminatedList { position }
            | BencodeError::UnterminatedDict { position }
            | BencodeError::NonStringKey { position }
            | BencodeError::UnsupportedTag { position, .. }
            | BencodeError::UnexpectedEof { position }
            | BencodeError::TrailingData { position }
            | BencodeError::NestingTooDeep { position } => *position,
        }
    }
}

impl fmt::Display for BencodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BencodeError::MalformedLength { position } => {
                write!(f, "malformed byte string length at offset {}", position)
            }
            BencodeError::MalformedInteger { position } => {
                write!(f, "malformed integer at offset {}", position)
            }
            BencodeError::UnterminatedList { position } => {
                write!(f, "unterminated list starting at offset {}", position)
            }
            BencodeError::UnterminatedDict { position } => {
                write!(f, "unterminated dictionary starting at offset {}", position)
            }
            BencodeError::NonStringKey { position } => {
                write!(f, "dictionary key is not a byte string at offset {}", position)
            }
            BencodeError::UnsupportedTag { position, tag } => {
                write!(f, "unsupported value tag 0x{:02x} at offset {}", tag, position)
            }
            BencodeError::UnexpectedEof { position } => {
                write!(f, "unexpected end of input at offset {}", position)
            }
            BencodeError::TrailingData { position } => {
                write!(f, "trailing data after value at offset {}", position)
            }
            BencodeError::NestingTooDeep { position } => {
                write!(f, "nesting too deep at offset {}", position)
            }
        }
    }
}

impl std::error::Error for BencodeError {}

/// Error type for every fallible operation in the crate
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Bencode parse failure
    Bencode(BencodeError),

    /// Top-level torrent value is not a dictionary
    NotADictionary,

    /// Required metadata field is absent
    MissingField {
        field: String,
    },

    /// Metadata field is present with the wrong bencode type
    WrongType {
        field: String,
        expected: &'static str,
    },

    /// Metadata field has the right type but an unusable value
    InvalidField {
        field: String,
        message: String,
    },

    /// `pieces` length is not a multiple of 20
    MalformedPieces {
        length: usize,
    },

    /// File or socket I/O errors outside a peer session
    Io {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Peer sent something the protocol does not allow at this point
    ProtocolViolation {
        message: String,
        peer: Option<String>,
    },

    /// Assembled piece does not hash to the expected value
    HashMismatch {
        piece: u32,
        expected: [u8; 20],
        actual: [u8; 20],
    },

    /// Socket error, premature close or timeout during a peer session
    ConnectionLost {
        peer: String,
        source: String,
    },

    /// Tracker request or response failure
    Tracker {
        message: String,
        source: Option<String>,
    },

    /// Configuration errors
    Config {
        message: String,
        field: Option<String>,
    },

    /// Every candidate peer failed for a piece
    PeersExhausted {
        piece: u32,
    },

    /// Operation aborted through a cancellation token
    Cancelled,
}

impl TorrentError {
    /// Create a new MissingField error
    pub fn missing_field(field: impl Into<String>) -> Self {
        TorrentError::MissingField { field: field.into() }
    }

    /// Create a new WrongType error
    pub fn wrong_type(field: impl Into<String>, expected: &'static str) -> Self {
        TorrentError::WrongType {
            field: field.into(),
            expected,
        }
    }

    /// Create a new InvalidField error
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        TorrentError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new Io error
    pub fn io_error(message: impl Into<String>) -> Self {
        TorrentError::Io {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new Io error with path and source
    pub fn io_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::Io {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ProtocolViolation
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        TorrentError::ProtocolViolation {
            message: message.into(),
            peer: None,
        }
    }

    /// Create a new ProtocolViolation attributed to a peer
    pub fn protocol_violation_with_peer(message: impl Into<String>, peer: impl Into<String>) -> Self {
        TorrentError::ProtocolViolation {
            message: message.into(),
            peer: Some(peer.into()),
        }
    }

    /// Create a new ConnectionLost error
    pub fn connection_lost(peer: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::ConnectionLost {
            peer: peer.into(),
            source: source.into(),
        }
    }

    /// Create a new Tracker error
    pub fn tracker_error(message: impl Into<String>) -> Self {
        TorrentError::Tracker {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Tracker error with source
    pub fn tracker_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::Tracker {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new Config error
    pub fn config_error(message: impl Into<String>) -> Self {
        TorrentError::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new Config error with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Whether the orchestrator may move on to another peer after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TorrentError::ProtocolViolation { .. }
                | TorrentError::ConnectionLost { .. }
                | TorrentError::HashMismatch { .. }
        )
    }

    /// Attach the peer address to peer-level errors that lack one
    pub fn with_peer(mut self, addr: impl Into<String>) -> Self {
        match &mut self {
            TorrentError::ProtocolViolation { peer, .. } if peer.is_none() => {
                *peer = Some(addr.into());
            }
            TorrentError::ConnectionLost { peer, .. } if peer == "unknown" => {
                *peer = addr.into();
            }
            _ => {}
        }
        self
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::Bencode(err) => write!(f, "Malformed bencode: {}", err),
            TorrentError::NotADictionary => write!(f, "Torrent file is not a bencode dictionary"),
            TorrentError::MissingField { field } => write!(f, "Missing field: {}", field),
            TorrentError::WrongType { field, expected } => {
                write!(f, "Wrong type for field {}: expected {}", field, expected)
            }
            TorrentError::InvalidField { field, message } => {
                write!(f, "Invalid field {}: {}", field, message)
            }
            TorrentError::MalformedPieces { length } => {
                write!(f, "Malformed pieces: length {} is not a multiple of 20", length)
            }
            TorrentError::Io { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "I/O error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "I/O error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "I/O error: {} (source: {})", message, s),
                    (None, None) => write!(f, "I/O error: {}", message),
                }
            }
            TorrentError::ProtocolViolation { message, peer } => {
                if let Some(p) = peer {
                    write!(f, "Protocol violation: {} (peer: {})", message, p)
                } else {
                    write!(f, "Protocol violation: {}", message)
                }
            }
            TorrentError::HashMismatch { piece, expected, actual } => {
                write!(
                    f,
                    "Hash mismatch for piece {}: expected {}, got {}",
                    piece,
                    hex::encode(expected),
                    hex::encode(actual)
                )
            }
            TorrentError::ConnectionLost { peer, source } => {
                write!(f, "Connection lost: {} (source: {})", peer, source)
            }
            TorrentError::Tracker { message, source } => {
                if let Some(src) = source {
                    write!(f, "Tracker error: {} (source: {})", message, src)
                } else {
                    write!(f, "Tracker error: {}", message)
                }
            }
            TorrentError::Config { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
            TorrentError::PeersExhausted { piece } => {
                write!(f, "All peers failed for piece {}", piece)
            }
            TorrentError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for TorrentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TorrentError::Bencode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BencodeError> for TorrentError {
    fn from(err: BencodeError) -> Self {
        TorrentError::Bencode(err)
    }
}

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err.kind().to_string()),
        }
    }
}

impl From<serde_json::Error> for TorrentError {
    fn from(err: serde_json::Error) -> Self {
        TorrentError::config_error(format!("Failed to parse JSON data: {}", err))
    }
}

impl From<std::net::AddrParseError> for TorrentError {
    fn from(err: std::net::AddrParseError) -> Self {
        TorrentError::config_error(format!("Failed to parse address: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for TorrentError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        TorrentError::connection_lost("unknown", "operation timed out")
    }
}

impl From<reqwest::Error> for TorrentError {
    fn from(err: reqwest::Error) -> Self {
        TorrentError::tracker_error_with_source("HTTP request failed", err.to_string())
    }
}

impl From<url::ParseError> for TorrentError {
    fn from(err: url::ParseError) -> Self {
        TorrentError::tracker_error_with_source("Invalid announce URL", err.to_string())
    }
}
