//! Output scheduler
//!
//! Drives the sink's clock. Frames are pre-rolled into the sink until the
//! preroll target is reached, then scheduled playback starts and every
//! completion notification pulls the next frame (or repeats the last one)
//! and schedules it one frame duration after the previous one.
//!
//! # State machine
//!
//! ```text
//!          first frame           preroll reached
//!  Idle ─────────────▶ Prerolling ──────────────▶ Running
//!    │                     │    and sink started     │
//!    │                     │                         │
//!    └─────────────────────┴────── shutdown ─────────┴──▶ Stopped
//! ```
//!
//! The scheduler is a single task fed by [`SchedulerEvent`]s, so sink
//! completions from a driver thread never touch scheduler state directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::PlayoutConfig;
use crate::convert::FrameConverter;
use crate::error::{PlayoutError, Result};
use crate::format::{Colorspace, OutputPixelFormat};
use crate::frame::Frame;
use crate::queue::PlaybackQueue;
use crate::sink::{CompletionResult, ModeFlags, OutputTiming, VideoSink};

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No frame accepted yet
    Idle,
    /// Handing frames to the sink before playback starts
    Prerolling,
    /// Scheduled playback running, paced by completions
    Running,
    /// Output stopped; nothing more is submitted
    Stopped,
}

/// Running counters kept by the scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Completion notifications received
    pub completed: u64,
    /// Completions reported as displayed late
    pub late: u64,
    /// Completions reported as dropped or flushed
    pub dropped: u64,
    /// Frames successfully handed to the sink
    pub scheduled: u64,
    /// Submissions that repeated the last frame on underrun
    pub repeated: u64,
    /// Frames skipped because conversion failed
    pub conversion_failures: u64,
    /// Frames the sink refused to schedule
    pub submit_failures: u64,
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    /// Current state
    pub state: SchedulerState,
    /// Counters so far
    pub stats: PlaybackStats,
    /// Frames waiting in the playback queue
    pub queued: usize,
    /// Queued frames evicted by newer ones before being scheduled
    pub evicted: u64,
    /// Display time the next submission will use
    pub next_time: i64,
}

/// Messages consumed by the scheduler task
#[derive(Debug)]
pub(crate) enum SchedulerEvent {
    /// Ingestion pushed a frame into the playback queue
    FrameAccepted,
    /// The sink finished with one frame
    Completed(CompletionResult),
    /// Report current state
    Snapshot(oneshot::Sender<SchedulerSnapshot>),
    /// Stop output and end the task
    Shutdown(oneshot::Sender<SchedulerSnapshot>),
}

/// Output mode, pixel format and colorspace chosen for a session
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPlan {
    /// Display mode
    pub timing: OutputTiming,
    /// Output pixel format
    pub format: OutputPixelFormat,
    /// Colorspace tag for YCbCr output
    pub colorspace: Colorspace,
}

/// Pick the first display mode matching the configured geometry and rate,
/// with the first supported format from the priority list
pub fn select_output(sink: &dyn VideoSink, config: &PlayoutConfig) -> Result<OutputPlan> {
    for timing in sink.display_modes() {
        let Some(fps) = timing.fps() else {
            trace!("Skipping mode {} with zero duration or scale", timing.name);
            continue;
        };
        if timing.width != config.width
            || timing.height != config.height
            || (fps - config.fps).abs() > config.timing_tolerance
        {
            continue;
        }

        for &format in &config.pixel_format_priority {
            if sink.supports_format(&timing, format) {
                let colorspace = resolve_colorspace(config.colorspace_override, timing.flags, timing.height);
                info!(
                    "Selected output mode {} ({}x{} @ {:.3} fps), format {}, colorspace {}",
                    timing.name, timing.width, timing.height, fps, format, colorspace
                );
                return Ok(OutputPlan {
                    timing,
                    format,
                    colorspace,
                });
            }
            debug!("Mode {} does not support {}", timing.name, format);
        }
    }

    Err(PlayoutError::NoSupportedTiming {
        width: config.width,
        height: config.height,
        fps: config.fps,
    })
}

/// Colorspace for a mode: override, then mode flags, then frame height
///
/// A Rec.2020 override is only honoured when the mode advertises Rec.2020.
pub fn resolve_colorspace(override_cs: Option<Colorspace>, flags: ModeFlags, height: u32) -> Colorspace {
    let auto = flags.colorspace().unwrap_or_else(|| Colorspace::for_height(height));

    match override_cs {
        Some(Colorspace::Rec2020) if !flags.rec2020 => {
            warn!("Mode does not support rec2020, using {}", auto);
            auto
        }
        Some(colorspace) => colorspace,
        None => auto,
    }
}

/// Rate limiter for periodic logs
#[derive(Debug)]
struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Completion-driven frame scheduler owning the sink
pub(crate) struct OutputScheduler<S> {
    sink: S,
    queue: Arc<PlaybackQueue>,
    plan: OutputPlan,
    converter: FrameConverter,
    state: SchedulerState,
    next_time: i64,
    preroll_target: usize,
    preroll_scheduled: usize,
    last_frame: Option<Frame>,
    stats: PlaybackStats,
    stats_log: Throttle,
    buffered_log: Throttle,
}

impl<S: VideoSink> OutputScheduler<S> {
    pub(crate) fn new(sink: S, queue: Arc<PlaybackQueue>, plan: OutputPlan, config: &PlayoutConfig) -> Self {
        let converter = FrameConverter::new(plan.format, plan.colorspace, config.range);
        Self {
            sink,
            queue,
            plan,
            converter,
            state: SchedulerState::Idle,
            next_time: 0,
            preroll_target: config.preroll_frames.max(1),
            preroll_scheduled: 0,
            last_frame: None,
            stats: PlaybackStats::default(),
            stats_log: Throttle::new(config.stats_interval()),
            buffered_log: Throttle::new(config.buffered_log_interval()),
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> SchedulerState {
        self.state
    }

    pub(crate) fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            state: self.state,
            stats: self.stats,
            queued: self.queue.len(),
            evicted: self.queue.evicted(),
            next_time: self.next_time,
        }
    }

    /// Handle a frame pushed by ingestion: preroll and start playback
    pub(crate) fn on_frame_accepted(&mut self) {
        match self.state {
            SchedulerState::Running | SchedulerState::Stopped => return,
            SchedulerState::Idle => {
                debug!("First frame accepted, prerolling {} frames", self.preroll_target);
                self.state = SchedulerState::Prerolling;
            }
            SchedulerState::Prerolling => {}
        }

        while self.preroll_scheduled < self.preroll_target {
            let Some(frame) = self.queue.try_pop() else {
                break;
            };
            self.last_frame = Some(frame.clone());
            if !self.submit(&frame) {
                break;
            }
            self.preroll_scheduled += 1;
        }

        if self.preroll_scheduled < self.preroll_target {
            return;
        }

        let time_scale = self.plan.timing.time_scale;
        match self.sink.start_scheduled_output(0, time_scale, 1.0) {
            Ok(()) => {
                info!("Scheduled playback started after {} preroll frames", self.preroll_scheduled);
                self.state = SchedulerState::Running;
            }
            Err(e) => {
                warn!("Failed to start scheduled playback, retrying on next frame: {}", e);
            }
        }
    }

    /// Handle a sink completion: count it, then keep the sink fed
    pub(crate) fn on_completion(&mut self, result: CompletionResult) {
        self.stats.completed += 1;
        match result {
            CompletionResult::DisplayedLate => self.stats.late += 1,
            CompletionResult::Dropped | CompletionResult::Flushed => self.stats.dropped += 1,
            CompletionResult::Completed => {}
        }

        if self.stats_log.ready() {
            info!(
                "Playback stats: completed={} late={} dropped={} repeated={}",
                self.stats.completed, self.stats.late, self.stats.dropped, self.stats.repeated
            );
        }

        if self.state != SchedulerState::Running {
            trace!("Completion while {:?}, not scheduling", self.state);
            return;
        }

        let frame = match self.queue.try_pop() {
            Some(frame) => frame,
            None => match &self.last_frame {
                Some(last) => {
                    self.stats.repeated += 1;
                    trace!("Playback queue empty, repeating last frame");
                    last.clone()
                }
                None => return,
            },
        };

        self.last_frame = Some(frame.clone());
        self.submit(&frame);
    }

    /// Convert and schedule one frame at the next display time
    ///
    /// Returns `false` if the frame was abandoned.
    fn submit(&mut self, frame: &Frame) -> bool {
        let output = match self.converter.convert(frame, &mut self.sink) {
            Ok(output) => output,
            Err(e) => {
                self.stats.conversion_failures += 1;
                if self.stats.conversion_failures == 1 {
                    warn!("Frame conversion failed, skipping frame: {}", e);
                } else {
                    trace!("Frame conversion failed, skipping frame: {}", e);
                }
                return false;
            }
        };

        let duration = self.plan.timing.frame_duration;
        let time_scale = self.plan.timing.time_scale;
        if let Err(e) = self.sink.schedule_frame(output, self.next_time, duration, time_scale) {
            self.stats.submit_failures += 1;
            warn!("Sink refused frame at {}: {}", self.next_time, e);
            return false;
        }

        self.stats.scheduled += 1;
        if self.buffered_log.ready() {
            if let Some(buffered) = self.sink.buffered_frame_count() {
                info!("Sink buffered frames: {}", buffered);
            }
        }
        self.next_time += duration;
        true
    }

    /// Stop output, drop queued frames and release conversion resources
    pub(crate) fn stop(&mut self) {
        if self.state == SchedulerState::Stopped {
            return;
        }

        if self.state != SchedulerState::Idle {
            if let Err(e) = self.sink.stop_scheduled_output() {
                warn!("Failed to stop scheduled playback: {}", e);
            }
        }
        if let Err(e) = self.sink.disable_output() {
            warn!("Failed to disable output: {}", e);
        }
        self.sink.set_completion_notifier(None);
        self.converter.release();

        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!("Dropped {} queued frames at stop", dropped);
        }

        self.state = SchedulerState::Stopped;
        info!(
            "Playback stopped: completed={} late={} dropped={} scheduled={} repeated={}",
            self.stats.completed, self.stats.late, self.stats.dropped, self.stats.scheduled, self.stats.repeated
        );
    }

    /// Process events until shutdown
    pub(crate) async fn run(mut self, mut events: mpsc::UnboundedReceiver<SchedulerEvent>) -> SchedulerSnapshot {
        while let Some(event) = events.recv().await {
            match event {
                SchedulerEvent::FrameAccepted => self.on_frame_accepted(),
                SchedulerEvent::Completed(result) => self.on_completion(result),
                SchedulerEvent::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                SchedulerEvent::Shutdown(reply) => {
                    self.stop();
                    let snapshot = self.snapshot();
                    let _ = reply.send(snapshot);
                    return snapshot;
                }
            }
        }

        self.stop();
        self.snapshot()
    }
}
