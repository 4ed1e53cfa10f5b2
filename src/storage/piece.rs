//! Piece storage module
//!
//! Splits pieces into request blocks, assembles received blocks and
//! verifies the result against the torrent's piece hash.

use sha1::{Digest, Sha1};
use tracing::{debug, trace, warn};

use crate::error::{Result, TorrentError};

/// Size of a block request (the last block of a piece may be shorter)
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// `(begin, length)` of every block in a piece of `piece_length` bytes
pub fn block_layout(piece_length: u32) -> Vec<(u32, u32)> {
    (0..piece_length)
        .step_by(BLOCK_SIZE as usize)
        .map(|begin| (begin, BLOCK_SIZE.min(piece_length - begin)))
        .collect()
}

/// Check assembled piece bytes against the expected SHA-1
pub fn verify_piece(data: &[u8], expected: &[u8; 20]) -> bool {
    piece_hash(data) == *expected
}

fn piece_hash(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Assembly buffer for one piece
#[derive(Debug, Clone)]
pub struct PieceBuffer {
    /// Piece index
    index: u32,
    /// Piece data, written block by block
    data: Vec<u8>,
    /// Bytes received so far
    received: usize,
}

impl PieceBuffer {
    /// Create a zeroed buffer of the piece's exact length
    pub fn new(index: u32, length: u32) -> Self {
        Self {
            index,
            data: vec![0u8; length as usize],
            received: 0,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy a block into the buffer at `begin`
    pub fn write_block(&mut self, begin: u32, block: &[u8]) -> Result<()> {
        let start = begin as usize;
        let end = start.checked_add(block.len()).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            warn!(
                "Block at {} with {} bytes overruns piece {} ({} bytes)",
                begin,
                block.len(),
                self.index,
                self.data.len()
            );
            return Err(TorrentError::protocol_violation(format!(
                "block at offset {} with {} bytes overruns piece {} of {} bytes",
                begin,
                block.len(),
                self.index,
                self.data.len()
            )));
        };

        self.data[start..end].copy_from_slice(block);
        self.received += block.len();
        trace!("Piece {}: wrote {} bytes at {}", self.index, block.len(), begin);
        Ok(())
    }

    /// Number of block bytes written so far
    pub fn bytes_received(&self) -> usize {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Hash the assembled piece and hand back its bytes if it matches
    pub fn verify(self, expected: &[u8; 20]) -> Result<Vec<u8>> {
        let actual = piece_hash(&self.data);
        if actual != *expected {
            warn!(
                "Piece {} failed verification: expected {}, got {}",
                self.index,
                hex::encode(expected),
                hex::encode(actual)
            );
            return Err(TorrentError::HashMismatch {
                piece: self.index,
                expected: *expected,
                actual,
            });
        }
        debug!("Piece {} verified ({} bytes)", self.index, self.data.len());
        Ok(self.data)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_layout_even() {
        assert_eq!(block_layout(32768), vec![(0, 16384), (16384, 16384)]);
    }

    #[test]
    fn test_block_layout_truncated_tail() {
        assert_eq!(block_layout(20000), vec![(0, 16384), (16384, 3616)]);
        assert_eq!(block_layout(100), vec![(0, 100)]);
        assert!(block_layout(0).is_empty());
    }

    #[test]
    fn test_verify_piece() {
        let data = b"some piece data".to_vec();
        let hash = piece_hash(&data);
        assert!(verify_piece(&data, &hash));

        for bit in [0usize, 7, 60, data.len() * 8 - 1] {
            let mut flipped = data.clone();
            flipped[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify_piece(&flipped, &hash));
        }
    }

    #[test]
    fn test_buffer_assembles_out_of_order() {
        let mut buffer = PieceBuffer::new(3, 20000);
        buffer.write_block(16384, &vec![2u8; 3616]).unwrap();
        assert!(!buffer.is_complete());
        buffer.write_block(0, &vec![1u8; 16384]).unwrap();
        assert!(buffer.is_complete());
        assert_eq!(buffer.bytes_received(), 20000);

        let data = buffer.into_bytes();
        assert_eq!(data[16383], 1);
        assert_eq!(data[16384], 2);
    }

    #[test]
    fn test_buffer_rejects_overrun() {
        let mut buffer = PieceBuffer::new(0, 100);
        assert!(matches!(
            buffer.write_block(90, &[0u8; 20]),
            Err(TorrentError::ProtocolViolation { .. })
        ));
        assert!(buffer.write_block(u32::MAX, &[0u8; 1]).is_err());
        assert_eq!(buffer.bytes_received(), 0);
    }

    #[test]
    fn test_buffer_verify() {
        let data = vec![7u8; 64];
        let hash = piece_hash(&data);

        let mut buffer = PieceBuffer::new(1, 64);
        buffer.write_block(0, &data).unwrap();
        assert_eq!(buffer.clone().verify(&hash).unwrap(), data);

        match buffer.verify(&[0u8; 20]) {
            Err(TorrentError::HashMismatch { piece, expected, actual }) => {
                assert_eq!(piece, 1);
                assert_eq!(expected, [0u8; 20]);
                assert_eq!(actual, hash);
            }
            other => panic!("expected HashMismatch, got {:?}", other),
        }
    }
}
