//! Ring channel source

use std::time::Duration;

use framebridge_bus::ChannelReader;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, trace};

use super::{FrameIngestor, FrameSource, IngestEnd, IngestStats};
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::frame::Frame;

/// Polls a ring channel and forwards each newly published frame
///
/// Frames keep the channel's pixel format. Only the newest frame is seen
/// per poll; sequences published in between are counted as missed.
#[derive(Debug)]
pub struct ChannelSource {
    reader: ChannelReader,
    poll_interval: Duration,
    last_sequence: u64,
    stats: IngestStats,
}

impl ChannelSource {
    /// Attach to `name`, requiring `width` x `height` frames
    pub fn open(name: &str, width: u32, height: u32, poll_interval: Duration) -> Result<Self> {
        let reader = ChannelReader::open(name)?;
        Self::from_reader(reader, width, height, poll_interval)
    }

    /// Wrap an attached reader, requiring `width` x `height` frames
    pub fn from_reader(reader: ChannelReader, width: u32, height: u32, poll_interval: Duration) -> Result<Self> {
        let geometry = *reader.geometry();
        reader.expect_geometry(width, height, geometry.pixel_format)?;
        info!(
            "Ingesting from channel {} ({}x{} {}, {} slots)",
            reader.name(),
            geometry.width,
            geometry.height,
            geometry.pixel_format,
            geometry.slot_count
        );

        Ok(Self {
            reader,
            poll_interval,
            last_sequence: 0,
            stats: IngestStats::default(),
        })
    }

    /// Counters so far
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Copy out the newest frame if its sequence advanced since the last poll
    ///
    /// A copy the writer may have overtaken is dropped and counted as torn.
    pub fn poll_once(&mut self) -> Option<Frame> {
        let view = self.reader.read_latest()?;
        let sequence = view.sequence();
        if sequence == self.last_sequence {
            return None;
        }

        if self.last_sequence != 0 && sequence > self.last_sequence + 1 {
            self.stats.sequences_missed += sequence - self.last_sequence - 1;
        }
        self.last_sequence = sequence;

        let data = view.copy_to_vec();
        if self.reader.sequence() != sequence && view.may_be_torn() {
            self.stats.frames_torn += 1;
            trace!("Dropping frame {} overtaken by the writer", sequence);
            return None;
        }

        let geometry = self.reader.geometry();
        Frame::new(data, geometry.width, geometry.height, geometry.pixel_format, view.timestamp_ns())
    }

    /// Poll until cancelled
    pub async fn ingest(&mut self, ingestor: &FrameIngestor, cancel: &CancelToken) -> Result<IngestEnd> {
        loop {
            if cancel.is_cancelled() {
                debug!("Channel ingestion cancelled at sequence {}", self.last_sequence);
                return Ok(IngestEnd::Cancelled);
            }

            if let Some(frame) = self.poll_once() {
                ingestor.accept(frame, &mut self.stats)?;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

impl FrameSource for ChannelSource {
    fn run<'a>(&'a mut self, ingestor: &'a FrameIngestor, cancel: &'a CancelToken) -> BoxFuture<'a, Result<IngestEnd>> {
        self.ingest(ingestor, cancel).boxed()
    }

    fn stats(&self) -> IngestStats {
        self.stats
    }
}
