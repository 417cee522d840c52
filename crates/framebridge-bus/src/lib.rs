//! # framebridge-bus
//!
//! Single-writer, multi-reader shared-memory ring channel for video frames.
//!
//! This crate is part of the [framebridge](https://github.com/framebridge/framebridge)
//! workspace. A producer process publishes fixed-size frames into a named
//! POSIX shared-memory object; any number of consumer processes attach by
//! name and fetch the newest frame without coordinating with the producer.
//!
//! # Features
//!
//! - **Lock-free publish**: one release store per frame, one acquire load per read
//! - **Latest-frame semantics**: readers always see the newest complete write
//! - **Self-describing header**: geometry, pixel format and slot layout travel
//!   with the channel, so readers need only its name
//! - **Stale-memory protection**: magic and layout are validated on open
//!
//! # Requirements
//!
//! - **Linux** (or another POSIX system with `shm_open`)
//! - A **little-endian** target
//! - **Rust 1.77+**
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use framebridge_bus::{ChannelConfig, ChannelReader, ChannelWriter, PixelFormat};
//!
//! # fn main() -> framebridge_bus::Result<()> {
//! let config = ChannelConfig::builder()
//!     .name("program-out")
//!     .resolution(1280, 720)
//!     .pixel_format(PixelFormat::Rgba8)
//!     .build();
//!
//! let mut writer = ChannelWriter::create(&config)?;
//! let frame = vec![0u8; config.frame_size().unwrap_or(0) as usize];
//! writer.write(&frame, None)?;
//!
//! // Usually in another process:
//! let reader = ChannelReader::open("program-out")?;
//! if let Some(view) = reader.read_latest() {
//!     let pixels = view.copy_to_vec();
//!     println!("frame {} ({} bytes)", view.sequence(), pixels.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │  ChannelWriter     │ ◄── create(), one per channel
//! │  (producer)        │     write(frame, timestamp)
//! └─────────┬──────────┘
//!           │ copy into slot seq % N, then release-store seq + 1
//!           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │ /dev/shm/<name>                                           │
//! │ ┌────────────┬──────────┬──────────┬─────┬──────────────┐ │
//! │ │ header 128 │  slot 0  │  slot 1  │ ... │  slot N-1    │ │
//! │ └────────────┴──────────┴──────────┴─────┴──────────────┘ │
//! └─────────┬────────────────────────────────────────────────┘
//!           │ acquire-load seq, read slot (seq - 1) % N
//!           ▼
//! ┌────────────────────┐
//! │  ChannelReader     │ ◄── open(), any number, any process
//! │  (consumers)       │     read_latest() -> FrameView
//! └────────────────────┘
//! ```
//!
//! # Tearing
//!
//! There is no reader/writer handshake. A reader slower than
//! `slot_count - 1` frame periods can observe a slot while the writer
//! rewrites it. [`FrameView::may_be_torn`] reports whether that can have
//! happened. [`ChannelConfigBuilder`] sizes the ring with
//! [`recommended_slot_count`] unless a slot count is given.

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod channel;
pub mod config;
pub mod error;
pub mod format;
pub mod layout;
pub mod shm;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

pub use channel::{ChannelReader, ChannelWriter, FrameView};
pub use config::{ChannelConfig, ChannelConfigBuilder, MAX_SLOT_COUNT};
pub use error::{BusError, Result};
pub use format::{frame_size, ChannelOffsets, PixelFormat, BYTES_PER_PIXEL};
pub use layout::{ChannelGeometry, CHANNEL_MAGIC, CHANNEL_VERSION, HEADER_SIZE};
pub use shm::shm_name;

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Recommended slot count for a given producer frame rate
///
/// Gives a reader roughly 50ms of slack before it can observe a torn
/// frame, with a floor of 3 slots and a ceiling of 8.
///
/// # Arguments
///
/// * `fps` - Producer frame rate
///
/// # Returns
///
/// Recommended slot count (3-8)
#[must_use]
pub fn recommended_slot_count(fps: u32) -> u32 {
    // Frames in 50ms, plus the slot being written and the one being read
    (fps / 20 + 2).clamp(3, 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommended_slot_count() {
        assert_eq!(recommended_slot_count(25), 3);
        assert_eq!(recommended_slot_count(60), 5);
        assert_eq!(recommended_slot_count(120), 8);
        assert_eq!(recommended_slot_count(240), 8); // Capped at 8
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
