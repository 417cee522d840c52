//! Owned input frames
//!
//! A [`Frame`] is a tightly packed 4-byte-per-pixel buffer plus the
//! geometry it was validated against. The pixel data sits behind an `Arc`
//! so the scheduler can keep the last frame for underrun repeats without
//! copying it.

use std::sync::Arc;

use framebridge_bus::PixelFormat;

/// One validated input frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Arc<[u8]>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Channel order of `data`
    pub format: PixelFormat,
    /// Producer timestamp (ns for ring frames, producer units for streamed ones)
    pub timestamp: u64,
}

impl Frame {
    /// Wrap a buffer of exactly `width * height * 4` bytes
    ///
    /// Returns `None` when the length does not match the geometry.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat, timestamp: u64) -> Option<Self> {
        if data.len() != Self::expected_len(width, height) {
            return None;
        }
        Some(Self {
            data: Arc::from(data),
            width,
            height,
            format,
            timestamp,
        })
    }

    /// Bytes a frame of this geometry must carry
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * framebridge_bus::BYTES_PER_PIXEL
    }

    /// Pixel bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
