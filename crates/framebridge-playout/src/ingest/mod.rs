//! Frame ingestion
//!
//! Two interchangeable sources feed validated frames into the
//! [`PlaybackQueue`]:
//!
//! - [`StreamSource`]: header-framed frames on any `AsyncRead`
//! - [`ChannelSource`]: polls a ring channel and forwards new sequences
//!
//! Every accepted frame also nudges the scheduler so it can preroll.

mod channel;
mod stream;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

pub use channel::ChannelSource;
pub use stream::StreamSource;

use crate::cancel::CancelToken;
use crate::error::{PlayoutError, Result};
use crate::frame::Frame;
use crate::queue::PlaybackQueue;
use crate::scheduler::SchedulerEvent;

/// Counters kept by a frame source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Frames pushed into the playback queue
    pub frames_accepted: u64,
    /// Streamed frames discarded for a geometry or length mismatch
    pub frames_rejected: u64,
    /// Streamed messages with an unknown type
    pub frames_unknown_type: u64,
    /// Ring frames dropped because the writer overtook the copy
    pub frames_torn: u64,
    /// Ring sequences published but never observed
    pub sequences_missed: u64,
    /// Payload bytes read and dropped
    pub bytes_discarded: u64,
}

impl IngestStats {
    /// Add another source's counters to these
    pub(crate) fn merge(&mut self, other: &IngestStats) {
        self.frames_accepted += other.frames_accepted;
        self.frames_rejected += other.frames_rejected;
        self.frames_unknown_type += other.frames_unknown_type;
        self.frames_torn += other.frames_torn;
        self.sequences_missed += other.sequences_missed;
        self.bytes_discarded += other.bytes_discarded;
    }
}

/// Why ingestion ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestEnd {
    /// The producer sent an explicit shutdown message
    Shutdown,
    /// The byte stream ended
    EndOfStream,
    /// The cancel token fired
    Cancelled,
}

/// Pushes frames into the playback queue and notifies the scheduler
#[derive(Debug, Clone)]
pub struct FrameIngestor {
    queue: Arc<PlaybackQueue>,
    events: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl FrameIngestor {
    pub(crate) fn new(queue: Arc<PlaybackQueue>, events: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        Self {
            queue,
            events: Some(events),
        }
    }

    /// Ingestor that only fills `queue`, with no scheduler attached
    pub fn queue_only(queue: Arc<PlaybackQueue>) -> Self {
        Self { queue, events: None }
    }

    /// Queue a frame and wake the scheduler
    ///
    /// Evictions are counted by the queue itself. Fails with [`PlayoutError::SchedulerClosed`] once the scheduler task
    /// has stopped.
    pub fn accept(&self, frame: Frame, stats: &mut IngestStats) -> Result<()> {
        self.queue.push(frame);
        stats.frames_accepted += 1;

        if let Some(events) = &self.events {
            events
                .send(SchedulerEvent::FrameAccepted)
                .map_err(|_| PlayoutError::SchedulerClosed)?;
        }
        Ok(())
    }
}

/// A source of validated frames
pub trait FrameSource: Send {
    /// Ingest until shutdown, end of input, cancellation or a fatal error
    fn run<'a>(&'a mut self, ingestor: &'a FrameIngestor, cancel: &'a CancelToken) -> BoxFuture<'a, Result<IngestEnd>>;

    /// Counters so far
    fn stats(&self) -> IngestStats;
}

#[cfg(test)]
mod tests {
    use super::*;
    use framebridge_bus::PixelFormat;

    fn frame(tag: u8) -> Frame {
        Frame::new(vec![tag; 4], 1, 1, PixelFormat::Rgba8, 0).expect("frame")
    }

    #[test]
    fn test_accept_overflow_evicts_in_queue() {
        let queue = Arc::new(PlaybackQueue::new(1));
        let ingestor = FrameIngestor::queue_only(queue.clone());
        let mut stats = IngestStats::default();

        ingestor.accept(frame(1), &mut stats).expect("accept");
        ingestor.accept(frame(2), &mut stats).expect("accept");

        assert_eq!(stats.frames_accepted, 2);
        assert_eq!(queue.evicted(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_accept_fails_when_scheduler_gone() {
        let queue = Arc::new(PlaybackQueue::new(2));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let ingestor = FrameIngestor::new(queue, tx);

        let err = ingestor
            .accept(frame(1), &mut IngestStats::default())
            .expect_err("closed");
        assert!(matches!(err, PlayoutError::SchedulerClosed));
    }
}
