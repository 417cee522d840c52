//! Playout session
//!
//! Ties the pieces together: negotiates an output mode with the sink,
//! enables output, spawns the scheduler task and runs ingestion into the
//! shared playback queue.
//!
//! # Lifecycle
//!
//! ```text
//! start(config, sink)
//!   validate ─▶ select_output ─▶ enable_output ─▶ register notifier ─▶ spawn scheduler
//!
//! run_stream(reader, cancel) / run_channel(cancel)
//!   ingestion ─▶ PlaybackQueue ─▶ FrameAccepted ─▶ scheduler
//!
//! shutdown()
//!   scheduler: stop output ─▶ disable output ─▶ unregister notifier ─▶ drop converter
//! ```

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cancel::CancelToken;
use crate::config::{PlayoutConfig, SourceConfig};
use crate::error::{classify_error, ErrorClass, PlayoutError, Result};
use crate::ingest::{ChannelSource, FrameIngestor, FrameSource, IngestEnd, IngestStats, StreamSource};
use crate::queue::PlaybackQueue;
use crate::scheduler::{
    select_output, OutputPlan, OutputScheduler, PlaybackStats, SchedulerEvent, SchedulerSnapshot, SchedulerState,
};
use crate::sink::{CompletionNotifier, VideoSink};

/// Final counters of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayoutReport {
    /// Ingestion counters summed over all runs
    pub ingest: IngestStats,
    /// Scheduler counters
    pub playback: PlaybackStats,
    /// Queued frames evicted by newer ones before being scheduled
    pub frames_evicted: u64,
    /// Scheduler state after shutdown
    pub final_state: SchedulerState,
}

/// A running playout session
///
/// Must be created inside a tokio runtime. Dropping the session without
/// calling [`shutdown`](Self::shutdown) still stops the scheduler, but the
/// report is lost.
#[derive(Debug)]
pub struct PlayoutSession {
    config: PlayoutConfig,
    plan: OutputPlan,
    queue: Arc<PlaybackQueue>,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    task: Option<JoinHandle<SchedulerSnapshot>>,
    ingest: IngestStats,
}

impl PlayoutSession {
    /// Negotiate output with `sink`, enable it and start the scheduler
    ///
    /// Every error here is fatal at setup.
    pub fn start<S: VideoSink>(config: PlayoutConfig, mut sink: S) -> Result<Self> {
        config
            .validate()
            .map_err(|issues| PlayoutError::invalid_config(issues.join("; ")))?;

        let plan = select_output(&sink, &config)?;
        sink.enable_output(&plan.timing, plan.format)?;

        let (events, rx) = mpsc::unbounded_channel();
        sink.set_completion_notifier(Some(CompletionNotifier::new(events.clone())));

        let queue = Arc::new(PlaybackQueue::new(config.queue_capacity));
        let scheduler = OutputScheduler::new(sink, queue.clone(), plan.clone(), &config);
        let task = tokio::spawn(scheduler.run(rx));

        info!(
            "Playout session started: {}x{} @ {} fps, queue {}, preroll {}",
            config.width, config.height, config.fps, config.queue_capacity, config.preroll_frames
        );

        Ok(Self {
            config,
            plan,
            queue,
            events,
            task: Some(task),
            ingest: IngestStats::default(),
        })
    }

    /// Output mode, format and colorspace in use
    pub fn plan(&self) -> &OutputPlan {
        &self.plan
    }

    /// Session configuration
    pub fn config(&self) -> &PlayoutConfig {
        &self.config
    }

    /// Ingestion counters so far
    pub fn ingest_stats(&self) -> IngestStats {
        self.ingest
    }

    /// Ingest header-framed frames from `reader`
    pub async fn run_stream<R>(&mut self, reader: R, cancel: &CancelToken) -> Result<IngestEnd>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut source = StreamSource::new(reader, self.config.width, self.config.height);
        self.run_source(&mut source, cancel).await
    }

    /// Ingest from the ring channel named in the configuration
    pub async fn run_channel(&mut self, cancel: &CancelToken) -> Result<IngestEnd> {
        let SourceConfig::Channel { name } = &self.config.source else {
            return Err(PlayoutError::invalid_config("source is not a ring channel"));
        };
        let mut source = ChannelSource::open(name, self.config.width, self.config.height, self.config.poll_interval())?;
        self.run_source(&mut source, cancel).await
    }

    /// Ingest from any frame source
    ///
    /// A fatal stream error also stops the scheduler.
    pub async fn run_source(&mut self, source: &mut dyn FrameSource, cancel: &CancelToken) -> Result<IngestEnd> {
        let ingestor = FrameIngestor::new(self.queue.clone(), self.events.clone());
        let result = source.run(&ingestor, cancel).await;
        self.ingest.merge(&source.stats());

        match &result {
            Ok(end) => debug!("Ingestion ended: {:?}", end),
            Err(e) if classify_error(e) == ErrorClass::FatalStream => {
                error!("Ingestion failed, stopping playback: {}", e);
                self.request_stop();
            }
            Err(e) => error!("Ingestion failed: {}", e),
        }
        result
    }

    /// Current scheduler state and counters
    pub async fn snapshot(&self) -> Result<SchedulerSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(SchedulerEvent::Snapshot(reply))
            .map_err(|_| PlayoutError::SchedulerClosed)?;
        rx.await.map_err(|_| PlayoutError::SchedulerClosed)
    }

    /// Stop output and return the final counters
    pub async fn shutdown(mut self) -> Result<PlayoutReport> {
        self.request_stop();
        let task = self.task.take().ok_or(PlayoutError::SchedulerClosed)?;
        let snapshot = task.await.map_err(|_| PlayoutError::SchedulerClosed)?;

        info!("Playout session shut down in state {:?}", snapshot.state);
        Ok(PlayoutReport {
            ingest: self.ingest,
            playback: snapshot.stats,
            frames_evicted: snapshot.evicted,
            final_state: snapshot.state,
        })
    }

    fn request_stop(&self) {
        let (reply, _) = oneshot::channel();
        // The scheduler may already have stopped.
        let _ = self.events.send(SchedulerEvent::Shutdown(reply));
    }
}

impl Drop for PlayoutSession {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputPixelFormat;
    use crate::protocol::StreamWriter;
    use crate::sink::testing::MockSink;
    use crate::sink::{ModeFlags, OutputTiming};

    fn timing() -> OutputTiming {
        OutputTiming {
            name: "2x2p25".into(),
            width: 2,
            height: 2,
            frame_duration: 1,
            time_scale: 25,
            flags: ModeFlags::default(),
        }
    }

    fn config() -> PlayoutConfig {
        PlayoutConfig::builder()
            .resolution(2, 2)
            .fps(25.0)
            .preroll_frames(2)
            .build()
    }

    #[tokio::test]
    async fn test_start_enables_output_and_registers_notifier() {
        let sink = MockSink::new(vec![timing()]);
        let session = PlayoutSession::start(config(), sink.clone()).expect("start");

        let (enabled_timing, format) = sink.enabled().expect("enabled");
        assert_eq!(enabled_timing.name, "2x2p25");
        assert_eq!(format, OutputPixelFormat::Argb8);
        assert!(sink.has_notifier());

        let report = session.shutdown().await.expect("shutdown");
        assert_eq!(report.final_state, SchedulerState::Stopped);
        assert!(sink.disabled());
        assert!(!sink.has_notifier());
    }

    #[tokio::test]
    async fn test_start_fails_without_matching_mode() {
        let sink = MockSink::new(vec![timing()]);
        let config = PlayoutConfig::builder().resolution(4, 4).build();
        let err = PlayoutSession::start(config, sink.clone()).expect_err("no mode");
        assert_eq!(classify_error(&err), ErrorClass::FatalSetup);
        assert!(sink.enabled().is_none());
    }

    #[tokio::test]
    async fn test_start_fails_when_sink_refuses() {
        let sink = MockSink::new(vec![timing()]).failing_enable();
        let err = PlayoutSession::start(config(), sink).expect_err("refused");
        assert_eq!(classify_error(&err), ErrorClass::FatalSetup);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let sink = MockSink::new(vec![timing()]);
        let config = PlayoutConfig {
            queue_capacity: 0,
            ..config()
        };
        assert!(matches!(
            PlayoutSession::start(config, sink),
            Err(PlayoutError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_preroll_and_start() {
        let sink = MockSink::new(vec![timing()]);
        let mut session = PlayoutSession::start(config(), sink.clone()).expect("start");

        let mut writer = StreamWriter::new(Vec::new());
        for tag in 0..2u8 {
            writer.write_frame(2, 2, u64::from(tag), &[tag; 16]).await.expect("frame");
        }
        writer.write_shutdown().await.expect("shutdown");
        let bytes = writer.into_inner();

        let end = session
            .run_stream(bytes.as_slice(), &CancelToken::new())
            .await
            .expect("ingest");
        assert_eq!(end, IngestEnd::Shutdown);

        let snapshot = session.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.state, SchedulerState::Running);
        assert_eq!(sink.started(), Some((0, 25)));

        let report = session.shutdown().await.expect("shutdown");
        assert_eq!(report.ingest.frames_accepted, 2);
        assert_eq!(report.playback.scheduled, 2);
        assert!(sink.stopped());
    }

    #[tokio::test]
    async fn test_corrupt_stream_stops_scheduler() {
        let sink = MockSink::new(vec![timing()]);
        let mut session = PlayoutSession::start(config(), sink.clone()).expect("start");

        let garbage = [0xABu8; 28];
        let err = session
            .run_stream(&garbage[..], &CancelToken::new())
            .await
            .expect_err("corrupt");
        assert_eq!(classify_error(&err), ErrorClass::FatalStream);

        let report = session.shutdown().await.expect("shutdown");
        assert_eq!(report.final_state, SchedulerState::Stopped);
        assert!(sink.disabled());
    }

    #[tokio::test]
    async fn test_run_channel_requires_channel_source() {
        let sink = MockSink::new(vec![timing()]);
        let mut session = PlayoutSession::start(config(), sink).expect("start");
        let err = session.run_channel(&CancelToken::new()).await.expect_err("stream config");
        assert!(matches!(err, PlayoutError::InvalidConfig(_)));
    }
}
