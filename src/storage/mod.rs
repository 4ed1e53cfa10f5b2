//! Storage module
//!
//! Piece assembly and verification, storage backends and the download
//! manager.

pub mod backend;
pub mod download;
pub mod piece;

// Re-export backend types
pub use backend::{FileBackend, MemoryBackend, StorageBackend, StorageType};

// Re-export piece types
pub use piece::{block_layout, verify_piece, PieceBuffer, BLOCK_SIZE};

// Re-export download types
pub use download::{DownloadManager, DownloadStats};
