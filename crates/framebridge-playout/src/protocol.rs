//! Streamed frame protocol
//!
//! Each message is a 28-byte big-endian header, optionally followed by
//! `payload_len` bytes of RGBA8 pixel data:
//!
//! ```text
//! offset  size  field
//! 0       4     magic          0x42524746 ("BRGF")
//! 4       2     version        1
//! 6       2     frame_type     1 = frame, 2 = shutdown
//! 8       4     width
//! 12      4     height
//! 16      8     timestamp
//! 24      4     payload_len
//! ```

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Stream header magic ("BRGF" big-endian)
pub const STREAM_MAGIC: u32 = 0x4252_4746;

/// Protocol version written and accepted
pub const STREAM_VERSION: u16 = 1;

/// Encoded header size
pub const STREAM_HEADER_SIZE: usize = 28;

/// Frame type carrying pixel data
pub const FRAME_TYPE_FRAME: u16 = 1;

/// Frame type signalling an orderly end of stream
pub const FRAME_TYPE_SHUTDOWN: u16 = 2;

/// Decoded stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Magic value
    pub magic: u32,
    /// Protocol version
    pub version: u16,
    /// Message type
    pub frame_type: u16,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Producer timestamp
    pub timestamp: u64,
    /// Bytes following the header
    pub payload_len: u32,
}

impl StreamHeader {
    /// Header for a frame message
    pub fn frame(width: u32, height: u32, timestamp: u64, payload_len: u32) -> Self {
        Self {
            magic: STREAM_MAGIC,
            version: STREAM_VERSION,
            frame_type: FRAME_TYPE_FRAME,
            width,
            height,
            timestamp,
            payload_len,
        }
    }

    /// Header for an end-of-stream message
    pub fn shutdown() -> Self {
        Self {
            frame_type: FRAME_TYPE_SHUTDOWN,
            ..Self::frame(0, 0, 0, 0)
        }
    }

    /// Decode a header without validating it
    pub fn decode(buf: &[u8; STREAM_HEADER_SIZE]) -> Self {
        let u16_at = |at: usize| u16::from_be_bytes([buf[at], buf[at + 1]]);
        let u32_at = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&buf[16..24]);

        Self {
            magic: u32_at(0),
            version: u16_at(4),
            frame_type: u16_at(6),
            width: u32_at(8),
            height: u32_at(12),
            timestamp: u64::from_be_bytes(timestamp),
            payload_len: u32_at(24),
        }
    }

    /// Encode to the wire layout
    pub fn encode(&self) -> [u8; STREAM_HEADER_SIZE] {
        let mut buf = [0u8; STREAM_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4..6].copy_from_slice(&self.version.to_be_bytes());
        buf[6..8].copy_from_slice(&self.frame_type.to_be_bytes());
        buf[8..12].copy_from_slice(&self.width.to_be_bytes());
        buf[12..16].copy_from_slice(&self.height.to_be_bytes());
        buf[16..24].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[24..28].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Whether magic and version match this protocol
    pub fn is_compatible(&self) -> bool {
        self.magic == STREAM_MAGIC && self.version == STREAM_VERSION
    }
}

/// Producer side of the frame stream
#[derive(Debug)]
pub struct StreamWriter<W> {
    inner: W,
    frames_written: u64,
}

impl<W: AsyncWrite + Unpin> StreamWriter<W> {
    /// Wrap a byte sink
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            frames_written: 0,
        }
    }

    /// Write one frame message
    ///
    /// The payload is sent as-is; the header's `payload_len` is its length.
    pub async fn write_frame(&mut self, width: u32, height: u32, timestamp: u64, payload: &[u8]) -> std::io::Result<()> {
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "payload exceeds 4 GiB"))?;
        let header = StreamHeader::frame(width, height, timestamp, payload_len);
        self.inner.write_all(&header.encode()).await?;
        self.inner.write_all(payload).await?;
        self.frames_written += 1;
        Ok(())
    }

    /// Write the end-of-stream message and flush
    pub async fn write_shutdown(&mut self) -> std::io::Result<()> {
        self.inner.write_all(&StreamHeader::shutdown().encode()).await?;
        self.inner.flush().await
    }

    /// Flush buffered bytes
    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush().await
    }

    /// Frames written so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Recover the byte sink
    pub fn into_inner(self) -> W {
        self.inner
    }
}
