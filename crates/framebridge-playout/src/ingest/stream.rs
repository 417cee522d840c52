//! Header-framed byte stream source

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use super::{FrameIngestor, FrameSource, IngestEnd, IngestStats};
use crate::cancel::CancelToken;
use crate::error::{PlayoutError, Result};
use crate::frame::Frame;
use crate::protocol::{StreamHeader, FRAME_TYPE_FRAME, FRAME_TYPE_SHUTDOWN, STREAM_HEADER_SIZE};
use framebridge_bus::PixelFormat;

/// Warnings of one kind logged before going quiet
const MAX_MISMATCH_LOGS: u32 = 2;

/// Outcome of one read against the stream
enum ReadOutcome {
    Done,
    Eof,
    Cancelled,
}

/// Reads RGBA8 frames framed by [`StreamHeader`]s
///
/// Frames must match the configured geometry exactly; mismatched payloads
/// are read and dropped so the next header stays aligned.
#[derive(Debug)]
pub struct StreamSource<R> {
    reader: R,
    width: u32,
    height: u32,
    stats: IngestStats,
    mismatch_logs: u32,
}

impl<R: AsyncRead + Unpin + Send> StreamSource<R> {
    /// Read frames of `width` x `height` from `reader`
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            stats: IngestStats::default(),
            mismatch_logs: 0,
        }
    }

    /// Recover the reader, positioned after the last consumed message
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Counters so far
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Ingest until a shutdown message, end of stream or cancellation
    ///
    /// A header with the wrong magic or version is fatal. Nothing past a
    /// shutdown message is read.
    pub async fn ingest(&mut self, ingestor: &FrameIngestor, cancel: &CancelToken) -> Result<IngestEnd> {
        let expected_len = Frame::expected_len(self.width, self.height);

        loop {
            if cancel.is_cancelled() {
                return Ok(IngestEnd::Cancelled);
            }

            let mut buf = [0u8; STREAM_HEADER_SIZE];
            match self.read_exact(&mut buf, cancel).await? {
                ReadOutcome::Done => {}
                ReadOutcome::Eof => {
                    debug!("Frame stream ended");
                    return Ok(IngestEnd::EndOfStream);
                }
                ReadOutcome::Cancelled => return Ok(IngestEnd::Cancelled),
            }

            let header = StreamHeader::decode(&buf);
            if !header.is_compatible() {
                warn!(
                    "Invalid stream header: magic 0x{:08x}, version {}",
                    header.magic, header.version
                );
                return Err(PlayoutError::StreamFormat {
                    magic: header.magic,
                    version: header.version,
                });
            }

            match header.frame_type {
                FRAME_TYPE_FRAME => {}
                FRAME_TYPE_SHUTDOWN => {
                    info!("Received shutdown message after {} frames", self.stats.frames_accepted);
                    return Ok(IngestEnd::Shutdown);
                }
                other => {
                    debug!("Skipping message of unknown type {}", other);
                    self.stats.frames_unknown_type += 1;
                    match self.discard(u64::from(header.payload_len), cancel).await? {
                        ReadOutcome::Done => continue,
                        ReadOutcome::Eof => return Ok(IngestEnd::EndOfStream),
                        ReadOutcome::Cancelled => return Ok(IngestEnd::Cancelled),
                    }
                }
            }

            let len = header.payload_len as usize;
            if header.width != self.width || header.height != self.height || len != expected_len {
                if self.mismatch_logs < MAX_MISMATCH_LOGS {
                    self.mismatch_logs += 1;
                    let mismatch = PlayoutError::GeometryMismatch {
                        expected_width: self.width,
                        expected_height: self.height,
                        expected_len,
                        width: header.width,
                        height: header.height,
                        len,
                    };
                    warn!("Discarding frame: {}", mismatch);
                }
                self.stats.frames_rejected += 1;
                match self.discard(u64::from(header.payload_len), cancel).await? {
                    ReadOutcome::Done => continue,
                    ReadOutcome::Eof => return Ok(IngestEnd::EndOfStream),
                    ReadOutcome::Cancelled => return Ok(IngestEnd::Cancelled),
                }
            }

            let mut data = vec![0u8; len];
            match self.read_exact(&mut data, cancel).await? {
                ReadOutcome::Done => {}
                ReadOutcome::Eof => {
                    debug!("Frame stream ended mid-payload");
                    return Ok(IngestEnd::EndOfStream);
                }
                ReadOutcome::Cancelled => return Ok(IngestEnd::Cancelled),
            }

            if let Some(frame) = Frame::new(data, self.width, self.height, PixelFormat::Rgba8, header.timestamp) {
                ingestor.accept(frame, &mut self.stats)?;
            }
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8], cancel: &CancelToken) -> Result<ReadOutcome> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(ReadOutcome::Cancelled),
            read = self.reader.read_exact(buf) => match read {
                Ok(_) => Ok(ReadOutcome::Done),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(ReadOutcome::Eof),
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn discard(&mut self, len: u64, cancel: &CancelToken) -> Result<ReadOutcome> {
        let mut limited = (&mut self.reader).take(len);
        let mut sink = tokio::io::sink();
        let copied = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(ReadOutcome::Cancelled),
            copied = tokio::io::copy(&mut limited, &mut sink) => copied?,
        };

        self.stats.bytes_discarded += copied;
        if copied < len {
            Ok(ReadOutcome::Eof)
        } else {
            Ok(ReadOutcome::Done)
        }
    }
}

impl<R: AsyncRead + Unpin + Send> FrameSource for StreamSource<R> {
    fn run<'a>(&'a mut self, ingestor: &'a FrameIngestor, cancel: &'a CancelToken) -> BoxFuture<'a, Result<IngestEnd>> {
        self.ingest(ingestor, cancel).boxed()
    }

    fn stats(&self) -> IngestStats {
        self.stats
    }
}
