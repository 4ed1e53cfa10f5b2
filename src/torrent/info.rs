//! Torrent metadata structures
//!
//! Provides the immutable metadata derived from a `.torrent` file.

use sha1::{Digest, Sha1};

use crate::error::{Result, TorrentError};

/// Length in bytes of a SHA-1 digest
pub const HASH_LENGTH: usize = 20;

/// Metadata for a single-file torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaInfo {
    /// Tracker announce URL
    pub announce: String,
    /// Suggested file name, when the torrent carries one
    pub name: Option<String>,
    /// Total content length in bytes
    pub length: u64,
    /// Size of each piece in bytes (the last piece may be shorter)
    pub piece_length: u64,
    /// Expected SHA-1 hash of each piece, in order
    pub pieces: Vec<[u8; 20]>,
    /// SHA-1 of the canonically encoded info dictionary
    pub info_hash: [u8; 20],
}

impl MetaInfo {
    /// Get number of pieces in torrent
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Number of pieces implied by `length` and `piece_length`
    pub fn expected_piece_count(&self) -> u64 {
        if self.piece_length == 0 {
            return 0;
        }
        self.length.div_ceil(self.piece_length)
    }

    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// Hex strings of every piece hash, in order
    pub fn piece_hashes_hex(&self) -> Vec<String> {
        self.pieces.iter().map(hex::encode).collect()
    }

    /// Get piece hash for a specific piece index
    pub fn piece_hash(&self, index: u32) -> Option<[u8; 20]> {
        self.pieces.get(index as usize).copied()
    }

    /// Byte offset of a piece within the content
    pub fn piece_offset(&self, index: u32) -> Result<u64> {
        (index as u64).checked_mul(self.piece_length).ok_or_else(|| {
            TorrentError::invalid_field(
                "piece index",
                format!("offset of piece {} overflows with piece length {}", index, self.piece_length),
            )
        })
    }

    /// Exact length of a piece: `piece_length`, or the remainder for the last one
    pub fn piece_len(&self, index: u32) -> Result<u32> {
        if index as usize >= self.pieces.len() {
            return Err(TorrentError::invalid_field(
                "piece index",
                format!("{} out of range (torrent has {} pieces)", index, self.pieces.len()),
            ));
        }

        let start = self.piece_offset(index)?;
        let remaining = self.length.checked_sub(start).filter(|&r| r > 0).ok_or_else(|| {
            TorrentError::invalid_field(
                "piece index",
                format!("piece {} starts beyond the content length {}", index, self.length),
            )
        })?;

        let len = remaining.min(self.piece_length);
        u32::try_from(len).map_err(|_| TorrentError::invalid_field("piece length", "piece does not fit in 32 bits"))
    }

    /// Compute SHA-1 of arbitrary bytes
    pub fn sha1(data: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    /// Parse piece hashes from concatenated bytes in torrent file
    pub fn parse_piece_hashes(pieces_bytes: &[u8]) -> Result<Vec<[u8; 20]>> {
        if pieces_bytes.len() % HASH_LENGTH != 0 {
            return Err(TorrentError::MalformedPieces { length: pieces_bytes.len() });
        }

        Ok(pieces_bytes
            .chunks_exact(HASH_LENGTH)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(length: u64, piece_length: u64, count: usize) -> MetaInfo {
        MetaInfo {
            announce: "http://tracker.example.com/announce".to_string(),
            name: Some("sample.txt".to_string()),
            length,
            piece_length,
            pieces: (0..count).map(|i| [i as u8; 20]).collect(),
            info_hash: [1u8; 20],
        }
    }

    #[test]
    fn test_piece_len_uniform_and_last() {
        let info = sample(1500, 1024, 2);
        assert_eq!(info.piece_len(0).unwrap(), 1024);
        assert_eq!(info.piece_len(1).unwrap(), 476);
        assert!(info.piece_len(2).is_err());
    }

    #[test]
    fn test_piece_len_exact_multiple() {
        let info = sample(2048, 1024, 2);
        assert_eq!(info.piece_len(1).unwrap(), 1024);
    }

    #[test]
    fn test_piece_len_hash_beyond_content() {
        // three hashes but only two pieces worth of content
        let info = sample(2048, 1024, 3);
        assert!(info.piece_len(2).is_err());
    }

    #[test]
    fn test_piece_offset() {
        let info = sample(1500, 1024, 2);
        assert_eq!(info.piece_offset(0).unwrap(), 0);
        assert_eq!(info.piece_offset(1).unwrap(), 1024);
    }

    #[test]
    fn test_piece_offset_overflow_is_rejected() {
        let info = sample(i64::MAX as u64, 1 << 62, 5);
        assert_eq!(info.piece_offset(1).unwrap(), 1 << 62);
        assert!(matches!(info.piece_offset(4), Err(TorrentError::InvalidField { .. })));
        assert!(matches!(info.piece_len(4), Err(TorrentError::InvalidField { .. })));
    }

    #[test]
    fn test_expected_piece_count() {
        assert_eq!(sample(1500, 1024, 2).expected_piece_count(), 2);
        assert_eq!(sample(2048, 1024, 2).expected_piece_count(), 2);
        assert_eq!(sample(0, 1024, 0).expected_piece_count(), 0);
    }

    #[test]
    fn test_info_hash_hex() {
        let info = sample(1, 1, 1);
        assert_eq!(info.info_hash_hex(), "01".repeat(20));
        assert_eq!(info.piece_hashes_hex(), vec!["00".repeat(20)]);
    }

    #[test]
    fn test_sha1_known_vector() {
        assert_eq!(hex::encode(MetaInfo::sha1(b"abc")), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_parse_piece_hashes_valid() {
        let hashes: Vec<u8> = (0..40).map(|i| i as u8).collect();
        let result = MetaInfo::parse_piece_hashes(&hashes).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1][0], 20);
    }

    #[test]
    fn test_parse_piece_hashes_invalid() {
        let hashes = vec![1u8; 21];
        assert!(matches!(
            MetaInfo::parse_piece_hashes(&hashes),
            Err(TorrentError::MalformedPieces { length: 21 })
        ));
    }

    #[test]
    fn test_piece_hash() {
        let info = sample(2048, 1024, 2);
        assert_eq!(info.piece_hash(0), Some([0u8; 20]));
        assert_eq!(info.piece_hash(1), Some([1u8; 20]));
        assert_eq!(info.piece_hash(2), None);
    }
}
