//! # framebridge-playout
//!
//! Frame ingestion, conversion and clocked output scheduling for video
//! playout.
//!
//! This crate is part of the [framebridge](https://github.com/framebridge/framebridge)
//! workspace. It takes frames from a ring channel or a header-framed byte
//! stream, buffers them, converts them to the sink's pixel layout and
//! re-emits them at the sink's own clock rate, repeating the last frame
//! whenever input stalls.
//!
//! # Features
//!
//! - **Two sources**: [`ChannelSource`] polls a ring channel, [`StreamSource`]
//!   reads any `AsyncRead`
//! - **Drop-oldest queue**: the newest frames win under pressure
//! - **Preroll**: playback starts only once the sink holds enough frames
//! - **Underrun repeat**: the last frame is resubmitted when the queue is empty
//! - **Legal range and YCbCr**: channel reordering, 16-235 remap,
//!   8-bit and 10-bit 4:2:2 output
//! - **Paced display** (feature `display`): ring channel straight to a window
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use framebridge_playout::{CancelToken, PlayoutConfig, PlayoutSession};
//!
//! let config = PlayoutConfig::builder()
//!     .resolution(1920, 1080)
//!     .fps(50.0)
//!     .build();
//!
//! // `sink` implements VideoSink for the output device
//! let mut session = PlayoutSession::start(config, sink)?;
//! let cancel = CancelToken::new();
//! session.run_stream(tokio::io::stdin(), &cancel).await?;
//! let report = session.shutdown().await?;
//! println!("completed {} frames", report.playback.completed);
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   ┌───────────────┐
//! │ ChannelSource │   │ StreamSource  │ ◄── AsyncRead (pipe, socket)
//! └───────┬───────┘   └───────┬───────┘
//!         └─────────┬─────────┘
//!                   ▼ FrameIngestor::accept()
//!           ┌───────────────┐
//!           │ PlaybackQueue │  bounded, drop-oldest
//!           └───────┬───────┘
//!                   │ FrameAccepted / Completed events
//!                   ▼
//!         ┌───────────────────┐       ┌──────────────────┐
//!         │  OutputScheduler  │ ────▶ │  FrameConverter  │
//!         │  (tokio task)     │ ◀──── │  (+ YCbCr ctx)   │
//!         └─────────┬─────────┘       └──────────────────┘
//!                   │ schedule_frame(frame, t, duration, scale)
//!                   ▼
//!         ┌───────────────────┐
//!         │  VideoSink        │ ── CompletionNotifier ──▶ scheduler
//!         └───────────────────┘
//! ```
//!
//! # Error handling
//!
//! [`classify_error`] sorts every [`PlayoutError`] into setup failures,
//! stream failures, per-frame failures and single sink call failures.
//! Nothing is retried.

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod cancel;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod frame;
pub mod ingest;
pub mod protocol;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod yuv;

// =============================================================================
// FEATURE MODULES
// =============================================================================

/// Paced ring channel presentation
///
/// Requires the `display` feature.
#[cfg(feature = "display")]
pub mod display;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

pub use session::{PlayoutReport, PlayoutSession};

pub use config::{
    DisplayConfig, PlayoutConfig, PlayoutConfigBuilder, SourceConfig, ENV_CHANNEL_NAME, ENV_FRAME_FPS,
    ENV_FRAME_HEIGHT, ENV_FRAME_WIDTH,
};

pub use error::{classify_error, ConversionError, ErrorClass, PlayoutError, Result, SinkError};

pub use format::{parse_colorspace_override, Colorspace, OutputPixelFormat, SignalRange};

pub use sink::{
    ColorConverter, CompletionNotifier, CompletionResult, ModeFlags, OutputFrame, OutputTiming, VideoSink,
};

// =============================================================================
// RE-EXPORTS - BUILDING BLOCKS
// =============================================================================

pub use cancel::CancelToken;
pub use convert::{convert_rows, to_legal_range, FrameConverter};
pub use frame::Frame;
pub use ingest::{ChannelSource, FrameIngestor, FrameSource, IngestEnd, IngestStats, StreamSource};
pub use protocol::{StreamHeader, StreamWriter, STREAM_HEADER_SIZE, STREAM_MAGIC, STREAM_VERSION};
pub use queue::PlaybackQueue;
pub use scheduler::{
    resolve_colorspace, select_output, OutputPlan, PlaybackStats, SchedulerSnapshot, SchedulerState,
};
pub use yuv::SoftwareYuvConverter;

#[cfg(feature = "display")]
pub use display::{DisplayLoop, DisplayStats, Presenter, PresenterControl};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Recommended preroll depth for an output frame rate
///
/// Higher rates give the sink less time per frame, so more frames are
/// buffered before playback starts.
///
/// # Arguments
///
/// * `fps` - Output frame rate
///
/// # Returns
///
/// Recommended preroll frame count (2-5)
#[must_use]
pub fn recommended_preroll_frames(fps: f64) -> usize {
    match fps {
        f if f <= 30.0 => 2,
        f if f <= 60.0 => 3,
        f if f <= 120.0 => 4,
        _ => 5,
    }
}
