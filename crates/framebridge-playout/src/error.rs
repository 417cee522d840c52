//! Error types for playout operations
//!
//! Errors fall into four classes that decide what the caller does next:
//! abort startup, end the stream, skip one frame, or abandon one submission.
//! Nothing in this crate retries with backoff; see [`classify_error`].

use framebridge_bus::BusError;
use thiserror::Error;

use crate::format::OutputPixelFormat;

/// Errors that can occur while setting up or running playout
///
/// # Examples
///
/// ```rust,ignore
/// use framebridge_playout::{classify_error, ErrorClass, PlayoutSession};
///
/// match PlayoutSession::start(config, sink) {
///     Ok(session) => { /* run ingestion */ }
///     Err(e) => match classify_error(&e) {
///         ErrorClass::FatalSetup => std::process::exit(1),
///         _ => eprintln!("Error: {}", e),
///     },
/// }
/// ```
#[derive(Error, Debug)]
pub enum PlayoutError {
    /// Ring channel could not be opened or does not match
    #[error("Ring channel error: {0}")]
    Bus(#[from] BusError),

    /// The provided configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The sink offers no output timing for the requested geometry
    ///
    /// Raised when no display mode matches width, height and frame rate
    /// for any pixel format in the priority list.
    #[error("No supported output timing for {width}x{height} @ {fps} fps")]
    NoSupportedTiming {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Requested frame rate
        fps: f64,
    },

    /// The sink refused an operation
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Streamed frame header carries the wrong magic or version
    ///
    /// Framing can no longer be trusted, so ingestion ends.
    #[error("Stream format error: magic 0x{magic:08x}, version {version}")]
    StreamFormat {
        /// Magic value found in the header
        magic: u32,
        /// Version found in the header
        version: u16,
    },

    /// A frame does not match the expected geometry
    #[error("Frame geometry mismatch: expected {expected_width}x{expected_height} ({expected_len} bytes), got {width}x{height} ({len} bytes)")]
    GeometryMismatch {
        /// Expected width
        expected_width: u32,
        /// Expected height
        expected_height: u32,
        /// Expected payload length
        expected_len: usize,
        /// Width found in the frame
        width: u32,
        /// Height found in the frame
        height: u32,
        /// Payload length found in the frame
        len: usize,
    },

    /// A frame could not be converted to the output format
    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    /// I/O on the frame stream failed
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// The scheduler task is no longer running
    #[error("Scheduler is not running")]
    SchedulerClosed,
}

/// Result type for playout operations
pub type Result<T> = std::result::Result<T, PlayoutError>;

impl PlayoutError {
    /// Create an invalid config error
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Errors raised while converting a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The converter cannot produce this output format
    #[error("Unsupported output format: {0}")]
    Unsupported(OutputPixelFormat),

    /// Input buffer size does not match the frame geometry
    #[error("Input buffer is {actual} bytes, expected {expected}")]
    BufferSize {
        /// Bytes required by the geometry
        expected: usize,
        /// Bytes provided
        actual: usize,
    },

    /// The sink could not provide a colour conversion context
    #[error("No conversion context: {0}")]
    NoContext(String),
}

/// Errors reported by a video sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Enabling video output failed
    #[error("Failed to enable output: {0}")]
    EnableFailed(String),

    /// A frame could not be scheduled
    #[error("Failed to schedule frame: {0}")]
    ScheduleFailed(String),

    /// Starting or stopping scheduled playback failed
    #[error("Playback control failed: {0}")]
    PlaybackFailed(String),

    /// The presenter could not show a frame
    #[error("Presentation failed: {0}")]
    PresentFailed(String),

    /// Any other device error
    #[error("Device error: {0}")]
    Device(String),
}

/// Error classification for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Startup must be aborted with a non-zero status
    FatalSetup,
    /// Ingestion ends and the scheduler drains to `Stopped`
    FatalStream,
    /// The offending frame is skipped and processing continues
    RecoverableFrame,
    /// One sink call failed; that frame is abandoned
    TransientSink,
}

/// Classify an error to decide how to handle it
pub fn classify_error(error: &PlayoutError) -> ErrorClass {
    match error {
        PlayoutError::Bus(BusError::FrameSizeMismatch { .. }) => ErrorClass::RecoverableFrame,
        PlayoutError::Bus(_)
        | PlayoutError::InvalidConfig(_)
        | PlayoutError::NoSupportedTiming { .. }
        | PlayoutError::Sink(SinkError::EnableFailed(_)) => ErrorClass::FatalSetup,
        PlayoutError::StreamFormat { .. } | PlayoutError::Io(_) | PlayoutError::SchedulerClosed => {
            ErrorClass::FatalStream
        }
        PlayoutError::GeometryMismatch { .. } | PlayoutError::Conversion(_) => ErrorClass::RecoverableFrame,
        PlayoutError::Sink(_) => ErrorClass::TransientSink,
    }
}
