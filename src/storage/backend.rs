//! Storage backend abstraction for downloads
//!
//! Verified pieces are handed to a backend together with their absolute
//! offset in the torrent's content, so backends never need to know the
//! piece geometry.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error, info, trace};

use crate::error::{Result, TorrentError};

/// Destination for verified piece data
#[async_trait]
pub trait StorageBackend: Send {
    /// Prepare storage for `total_size` bytes of content
    async fn initialize(&mut self, total_size: u64) -> Result<()>;

    /// Write a verified piece at its absolute offset
    ///
    /// The data must be stored unmodified.
    async fn write_piece(&mut self, piece_index: u32, offset: u64, data: Bytes) -> Result<()>;

    /// Flush everything written so far
    async fn complete(&mut self) -> Result<()>;

    /// Get storage type identifier
    fn storage_type(&self) -> StorageType;
}

/// Storage type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// Local filesystem storage
    File,
    /// In-process buffer
    Memory,
}

/// Writes content to a single file on disk
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Option<fs::File>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_failure(&self, message: &str, err: std::io::Error) -> TorrentError {
        error!("{} '{}': {}", message, self.path.display(), err);
        TorrentError::io_error_full(message, self.path.display().to_string(), err.to_string())
    }

    async fn open(&mut self) -> Result<&mut fs::File> {
        if self.file.is_none() {
            let file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)
                .await
                .map_err(|e| self.io_failure("Failed to open file for writing", e))?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| TorrentError::io_error("output file is not open"))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn initialize(&mut self, total_size: u64) -> Result<()> {
        info!("Creating output file {} ({} bytes)", self.path.display(), total_size);
        let result = self.open().await?.set_len(total_size).await;
        result.map_err(|e| self.io_failure("Failed to size file", e))
    }

    async fn write_piece(&mut self, piece_index: u32, offset: u64, data: Bytes) -> Result<()> {
        trace!("Writing piece {} at offset {} ({} bytes)", piece_index, offset, data.len());
        let file = self.open().await?;
        let result = match file.seek(std::io::SeekFrom::Start(offset)).await {
            Ok(_) => file.write_all(&data).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.io_failure("Failed to write to file", e))?;
        debug!("Piece {} written to {}", piece_index, self.path.display());
        Ok(())
    }

    async fn complete(&mut self) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let result = match file.flush().await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.io_failure("Failed to flush file", e))?;
        debug!("Flushed {}", self.path.display());
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::File
    }
}

/// Keeps content in memory; useful for callers that want the bytes
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: Vec<u8>,
    pieces_written: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pieces_written(&self) -> usize {
        self.pieces_written
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn initialize(&mut self, total_size: u64) -> Result<()> {
        let size = usize::try_from(total_size)
            .map_err(|_| TorrentError::io_error(format!("{} bytes do not fit in memory", total_size)))?;
        self.data = vec![0u8; size];
        self.pieces_written = 0;
        Ok(())
    }

    async fn write_piece(&mut self, piece_index: u32, offset: u64, data: Bytes) -> Result<()> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(&data);
        self.pieces_written += 1;
        trace!("Piece {} stored in memory at {}", piece_index, offset);
        Ok(())
    }

    async fn complete(&mut self) -> Result<()> {
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("bittorrent-core-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_file_backend_writes_at_offsets() {
        let path = temp_path("backend-offsets");
        let mut backend = FileBackend::new(&path);
        assert_eq!(backend.storage_type(), StorageType::File);

        backend.initialize(10).await.unwrap();
        backend.write_piece(1, 6, Bytes::from_static(b"WXYZ")).await.unwrap();
        backend.write_piece(0, 0, Bytes::from_static(b"abcdef")).await.unwrap();
        backend.complete().await.unwrap();

        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, b"abcdefWXYZ");
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_file_backend_truncates_existing_file() {
        let path = temp_path("backend-truncate");
        tokio::fs::write(&path, vec![0xffu8; 64]).await.unwrap();

        let mut backend = FileBackend::new(&path);
        backend.initialize(4).await.unwrap();
        backend.write_piece(0, 0, Bytes::from_static(b"done")).await.unwrap();
        backend.complete().await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"done");
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_file_backend_bad_path() {
        let mut backend = FileBackend::new("/nonexistent-dir/for/sure/out.bin");
        assert!(matches!(
            backend.initialize(1).await,
            Err(TorrentError::Io { path: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let mut backend = MemoryBackend::new();
        backend.initialize(6).await.unwrap();
        backend.write_piece(1, 3, Bytes::from_static(b"def")).await.unwrap();
        backend.write_piece(0, 0, Bytes::from_static(b"abc")).await.unwrap();
        backend.complete().await.unwrap();

        assert_eq!(backend.pieces_written(), 2);
        assert_eq!(backend.into_bytes(), b"abcdef");
    }
}
