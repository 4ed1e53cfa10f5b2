//! Torrent file handling module
//!
//! This module provides functionality for parsing .torrent files into metadata.

pub mod info;
pub mod parser;

pub use info::{MetaInfo, HASH_LENGTH};
pub use parser::TorrentParser;
