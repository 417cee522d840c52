//! Error types for ring channel operations
//!
//! Provides typed errors so that openers can tell a missing channel apart
//! from stale or foreign shared memory.

use thiserror::Error;

/// Errors that can occur while creating, opening or writing a ring channel
///
/// # Examples
///
/// ```no_run
/// # use framebridge_bus::{BusError, ChannelReader};
/// match ChannelReader::open("program-out") {
///     Ok(reader) => println!("attached at sequence {}", reader.sequence()),
///     Err(BusError::ChannelNotFound(name)) => eprintln!("no writer has created {name} yet"),
///     Err(BusError::ChannelInvalid(reason)) => eprintln!("refusing stale channel: {reason}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum BusError {
    /// No backing shared-memory object exists under this name
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// The mapped header does not match the expected binary layout
    ///
    /// Raised for a wrong magic value, header size, unknown pixel format,
    /// or a mapping too small for the declared slots. Protects readers
    /// from stale or foreign shared memory.
    #[error("Channel header invalid: {0}")]
    ChannelInvalid(String),

    /// A channel with this name already exists
    ///
    /// Writers never adopt an existing object; the previous owner must
    /// unlink it first.
    #[error("Channel already exists: {0}")]
    ChannelExists(String),

    /// The channel name cannot be used as a POSIX shared-memory name
    #[error("Invalid channel name: {0:?}")]
    InvalidName(String),

    /// Requested geometry cannot be represented in the header
    #[error("Invalid channel geometry: {0}")]
    InvalidGeometry(String),

    /// A frame buffer did not match the channel's frame size
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSizeMismatch {
        /// Channel frame size
        expected: usize,
        /// Length of the buffer handed to the writer
        actual: usize,
    },

    /// I/O operation on the backing object failed
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// An operating system call failed
    #[error("System call failed: {0}")]
    Os(#[from] nix::errno::Errno),
}

/// Result type for ring channel operations
pub type Result<T> = std::result::Result<T, BusError>;

impl BusError {
    /// Create a channel invalid error
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::ChannelInvalid(msg.into())
    }

    /// Create an invalid geometry error
    pub(crate) fn geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }
}
