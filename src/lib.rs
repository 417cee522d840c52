//! # framebridge
//!
//! Shared-memory frame transport and clocked video playout for Rust.
//!
//! This crate provides a unified interface to the framebridge libraries:
//!
//! - **[`bus`]** - Single-writer, many-reader ring channel in POSIX shared memory
//! - **[`playout`]** - Frame ingestion, conversion and clocked output scheduling
//!
//! # Features
//!
//! All features are enabled by default. You can selectively enable only what you need:
//!
//! ```toml
//! # Use everything (default)
//! framebridge = "0.1"
//!
//! # Ring channel only
//! framebridge = { version = "0.1", default-features = false, features = ["bus"] }
//!
//! # All features including sub-crate features
//! framebridge = { version = "0.1", features = ["full"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `bus` | Yes | Shared-memory ring channel |
//! | `playout` | Yes | Ingestion and clocked playout (implies `bus`) |
//! | `full` | No | All features from all sub-crates |
//!
//! # Quick Start
//!
//! ## Publishing frames
//!
//! ```rust,ignore
//! use framebridge::bus::{ChannelConfig, ChannelWriter, PixelFormat};
//!
//! let config = ChannelConfig::builder()
//!     .name("program-out")
//!     .resolution(1920, 1080)
//!     .fps(50)
//!     .pixel_format(PixelFormat::Rgba8)
//!     .build();
//!
//! let mut writer = ChannelWriter::create(&config)?;
//! writer.write(&frame, None)?;
//! ```
//!
//! ## Full Pipeline: Channel → Playout → Sink
//!
//! ```rust,ignore
//! use framebridge::playout::{CancelToken, PlayoutConfig, PlayoutSession, SourceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PlayoutConfig::builder()
//!         .resolution(1920, 1080)
//!         .fps(50.0)
//!         .source(SourceConfig::Channel { name: "program-out".into() })
//!         .build();
//!
//!     // `sink` implements VideoSink for the output card
//!     let mut session = PlayoutSession::start(config, sink)?;
//!     session.run_channel(&CancelToken::new()).await?;
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          framebridge                            │
//! ├──────────────────────────────┬──────────────────────────────────┤
//! │        framebridge-bus       │        framebridge-playout       │
//! │                              │                                  │
//! │  ChannelWriter               │  PlayoutSession                  │
//! │  ChannelReader               │  StreamSource / ChannelSource    │
//! │  ChannelConfig               │  FrameConverter / VideoSink      │
//! └──────────────┬───────────────┴─────────────────┬────────────────┘
//!                │                                 │
//!                ▼                                 ▼
//!        POSIX shared memory             Output device (scheduled playback)
//! ```
//!
//! # Platform Support
//!
//! - **Linux** - The ring channel is backed by `shm_open` and `mmap`
//! - Other Unix systems with POSIX shared memory should work but are untested
//!
//! # Related Crates
//!
//! You can also use the individual crates directly:
//!
//! - [`framebridge-bus`](https://crates.io/crates/framebridge-bus) - Ring channel only
//! - [`framebridge-playout`](https://crates.io/crates/framebridge-playout) - Playout only

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// Shared-memory ring channel for raw video frames.
///
/// This module provides:
/// - A fixed 128-byte header describing geometry and slot layout
/// - Release/acquire publication of a monotonically increasing sequence
/// - Readers that attach by name and copy out the newest frame
///
/// See [`framebridge_bus`] documentation for details.
#[cfg(feature = "bus")]
#[cfg_attr(docsrs, doc(cfg(feature = "bus")))]
pub use framebridge_bus as bus;

/// Frame ingestion, conversion and clocked output scheduling.
///
/// This module provides:
/// - Ring channel and byte stream frame sources
/// - A bounded drop-oldest playback queue
/// - Preroll, underrun repeat and completion accounting
/// - Legal range remapping and 4:2:2 YCbCr conversion
///
/// See [`framebridge_playout`] documentation for details.
#[cfg(feature = "playout")]
#[cfg_attr(docsrs, doc(cfg(feature = "playout")))]
pub use framebridge_playout as playout;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use framebridge::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "bus")]
    pub use framebridge_bus::{BusError, ChannelConfig, ChannelReader, ChannelWriter, PixelFormat};

    #[cfg(feature = "playout")]
    pub use framebridge_playout::{
        CancelToken, OutputPixelFormat, PlayoutConfig, PlayoutError, PlayoutSession, SourceConfig, VideoSink,
    };
}
