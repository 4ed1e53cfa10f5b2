//! Wire protocol utilities
//!
//! Reads and writes handshakes and length-prefixed messages over any async
//! byte stream.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, trace};

use super::handshake::{Handshake, HANDSHAKE_LENGTH};
use super::message::Message;
use crate::error::{Result, TorrentError};

/// Largest frame accepted from a peer: a 16 KiB block request is far below
/// this, but some clients send bigger blocks or large bitfields.
pub const MAX_FRAME_LENGTH: usize = (1 << 20) + 13;

/// WireProtocol trait for protocol utilities
pub trait WireProtocol {
    /// Read a complete message from the stream
    async fn read_message<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Message>;

    /// Write a message to the stream
    async fn write_message<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, message: &Message) -> Result<()>;

    /// Read a handshake from the stream
    async fn read_handshake<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Handshake>;

    /// Write a handshake to the stream
    async fn write_handshake<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, handshake: &Handshake) -> Result<()>;
}

/// Default implementation of WireProtocol
#[derive(Debug, Clone)]
pub struct BitTorrentWire {
    max_frame_length: usize,
}

impl BitTorrentWire {
    pub fn new() -> Self {
        Self { max_frame_length: MAX_FRAME_LENGTH }
    }

    /// Wire handler with a custom frame size ceiling
    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }
}

impl Default for BitTorrentWire {
    fn default() -> Self {
        Self::new()
    }
}

/// Any short read, reset or write failure ends the session
fn stream_error(err: std::io::Error) -> TorrentError {
    trace!("Stream error: {}", err);
    TorrentError::connection_lost("unknown", err.to_string())
}

impl WireProtocol for BitTorrentWire {
    async fn read_message<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Message> {
        let mut length_buf = [0u8; 4];
        reader.read_exact(&mut length_buf).await.map_err(stream_error)?;
        let length = u32::from_be_bytes(length_buf) as usize;

        if length == 0 {
            trace!("Received KeepAlive");
            return Ok(Message::KeepAlive);
        }

        if length > self.max_frame_length {
            error!("Frame of {} bytes exceeds limit of {}", length, self.max_frame_length);
            return Err(TorrentError::protocol_violation(format!(
                "frame of {} bytes exceeds limit of {}",
                length, self.max_frame_length
            )));
        }

        let mut frame = vec![0u8; length];
        reader.read_exact(&mut frame).await.map_err(stream_error)?;

        Message::from_frame(&frame)
    }

    async fn write_message<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, message: &Message) -> Result<()> {
        let serialized = message.serialize();
        writer.write_all(&serialized).await.map_err(stream_error)?;
        writer.flush().await.map_err(stream_error)?;
        Ok(())
    }

    async fn read_handshake<R: AsyncReadExt + Unpin>(&mut self, reader: &mut R) -> Result<Handshake> {
        let mut packet = [0u8; HANDSHAKE_LENGTH];
        reader.read_exact(&mut packet).await.map_err(stream_error)?;
        Handshake::deserialize(&packet)
    }

    async fn write_handshake<W: AsyncWriteExt + Unpin>(&mut self, writer: &mut W, handshake: &Handshake) -> Result<()> {
        let serialized = handshake.serialize();
        writer.write_all(&serialized).await.map_err(stream_error)?;
        writer.flush().await.map_err(stream_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let mut wire = BitTorrentWire::new();

        let request = Message::Request { index: 3, begin: 0, length: 16384 };
        wire.write_message(&mut client, &request).await.unwrap();
        wire.write_message(&mut client, &Message::KeepAlive).await.unwrap();

        assert_eq!(wire.read_message(&mut server).await.unwrap(), request);
        assert_eq!(wire.read_message(&mut server).await.unwrap(), Message::KeepAlive);
    }

    #[tokio::test]
    async fn test_handshake_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let mut wire = BitTorrentWire::new();

        let handshake = Handshake::new([9u8; 20], [8u8; 20]);
        wire.write_handshake(&mut client, &handshake).await.unwrap();
        assert_eq!(wire.read_handshake(&mut server).await.unwrap(), handshake);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_lost() {
        use tokio::io::AsyncWriteExt;

        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&[0, 0, 0, 10, 7, 0]).await.unwrap();
        drop(client);

        let mut wire = BitTorrentWire::new();
        assert!(matches!(
            wire.read_message(&mut server).await,
            Err(TorrentError::ConnectionLost { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        use tokio::io::AsyncWriteExt;

        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&[0, 0, 1, 0]).await.unwrap();

        let mut wire = BitTorrentWire::with_max_frame_length(64);
        assert!(matches!(
            wire.read_message(&mut server).await,
            Err(TorrentError::ProtocolViolation { .. })
        ));
    }
}
