//! Clocked output sink contract
//!
//! A [`VideoSink`] is the external device this crate paces frames into: a
//! hardware video output or anything else with its own frame clock. The
//! crate never talks to device APIs directly; a sink implementation wraps
//! them and reports back through a [`CompletionNotifier`].
//!
//! # Completion flow
//!
//! ```text
//!  driver thread                      scheduler task
//!  ─────────────                      ──────────────
//!  frame N finished on air
//!  notifier.notify(result) ──event──▶ count result
//!                                     pop next frame (or repeat last)
//!                                     convert
//!  ◀──────────────── schedule_frame(frame, next_time, duration, scale)
//! ```
//!
//! `notify` only enqueues an event, so it never blocks the driver thread.

use tokio::sync::mpsc;

use crate::error::{ConversionError, SinkError};
use crate::format::{Colorspace, OutputPixelFormat, SignalRange};
use crate::scheduler::SchedulerEvent;
use crate::yuv::SoftwareYuvConverter;

/// Colorspace hints attached to a display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeFlags {
    /// Mode advertises BT.601
    pub rec601: bool,
    /// Mode advertises BT.709
    pub rec709: bool,
    /// Mode advertises BT.2020
    pub rec2020: bool,
}

impl ModeFlags {
    /// Colorspace implied by the flags, preferring BT.2020, then 709, then 601
    pub fn colorspace(&self) -> Option<Colorspace> {
        if self.rec2020 {
            Some(Colorspace::Rec2020)
        } else if self.rec709 {
            Some(Colorspace::Rec709)
        } else if self.rec601 {
            Some(Colorspace::Rec601)
        } else {
            None
        }
    }
}

/// One display mode offered by a sink
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTiming {
    /// Human-readable mode name
    pub name: String,
    /// Active width in pixels
    pub width: u32,
    /// Active height in pixels
    pub height: u32,
    /// Frame duration in `time_scale` units
    pub frame_duration: i64,
    /// Ticks per second
    pub time_scale: i64,
    /// Colorspace hints
    pub flags: ModeFlags,
}

impl OutputTiming {
    /// Frame rate, `None` if duration or scale is zero
    pub fn fps(&self) -> Option<f64> {
        if self.frame_duration <= 0 || self.time_scale <= 0 {
            return None;
        }
        Some(self.time_scale as f64 / self.frame_duration as f64)
    }
}

/// How a submitted frame left the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionResult {
    /// Displayed on time
    Completed,
    /// Displayed after its scheduled time
    DisplayedLate,
    /// Never displayed
    Dropped,
    /// Discarded when scheduled output stopped
    Flushed,
}

/// A frame in the sink's pixel layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row including padding
    pub row_bytes: usize,
    /// Pixel layout of `data`
    pub format: OutputPixelFormat,
    /// Colorspace tag, set for YCbCr frames
    pub colorspace: Option<Colorspace>,
    /// `row_bytes * height` bytes
    pub data: Vec<u8>,
}

/// Handle a sink uses to report completed frames
///
/// Cheap to clone and safe to call from any thread.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    tx: mpsc::UnboundedSender<SchedulerEvent>,
}

impl CompletionNotifier {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        Self { tx }
    }

    /// Report that one previously scheduled frame left the sink
    ///
    /// Returns `false` once the scheduler has gone away.
    pub fn notify(&self, result: CompletionResult) -> bool {
        self.tx.send(SchedulerEvent::Completed(result)).is_ok()
    }
}

/// Colour conversion context provided by a sink
pub trait ColorConverter: Send {
    /// Convert a BGRA8 staging frame whose RGB is in `range` into `target`
    ///
    /// YCbCr output is studio swing whatever the staging range.
    fn convert(
        &mut self,
        staging: &OutputFrame,
        target: OutputPixelFormat,
        colorspace: Colorspace,
        range: SignalRange,
    ) -> Result<OutputFrame, ConversionError>;
}

/// A clocked video output
///
/// All methods are called from the scheduler task, never concurrently.
pub trait VideoSink: Send + 'static {
    /// Display modes the device offers
    fn display_modes(&self) -> Vec<OutputTiming>;

    /// Whether `format` can be output in `timing` without device-side conversion
    fn supports_format(&self, timing: &OutputTiming, format: OutputPixelFormat) -> bool;

    /// Enable video output in the chosen mode and format
    fn enable_output(&mut self, timing: &OutputTiming, format: OutputPixelFormat) -> Result<(), SinkError>;

    /// Disable video output
    fn disable_output(&mut self) -> Result<(), SinkError>;

    /// Register (or with `None`, unregister) the completion notifier
    fn set_completion_notifier(&mut self, notifier: Option<CompletionNotifier>);

    /// Queue a frame for display at `display_time` (in `time_scale` units)
    fn schedule_frame(
        &mut self,
        frame: OutputFrame,
        display_time: i64,
        duration: i64,
        time_scale: i64,
    ) -> Result<(), SinkError>;

    /// Start the output clock at `start_time`
    fn start_scheduled_output(&mut self, start_time: i64, time_scale: i64, speed: f64) -> Result<(), SinkError>;

    /// Stop the output clock, flushing frames not yet displayed
    fn stop_scheduled_output(&mut self) -> Result<(), SinkError>;

    /// Frames queued inside the device, if the device reports it
    fn buffered_frame_count(&self) -> Option<u32> {
        None
    }

    /// Create a colour conversion context for YCbCr output
    ///
    /// Defaults to the software converter, which produces 8-bit 4:2:2
    /// (`2vuy`) and 10-bit 4:2:2 (`v210`).
    fn create_converter(&mut self) -> Result<Box<dyn ColorConverter>, SinkError> {
        Ok(Box::new(SoftwareYuvConverter::new()))
    }
}

/// Recording sink for tests and dry runs
pub mod testing {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::{
        ColorConverter, CompletionNotifier, CompletionResult, OutputFrame, OutputTiming, SinkError, VideoSink,
    };
    use crate::format::OutputPixelFormat;
    use crate::yuv::SoftwareYuvConverter;

    /// A frame as received by [`MockSink::schedule_frame`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ScheduledFrame {
        /// Converted frame
        pub frame: OutputFrame,
        /// Requested display time
        pub display_time: i64,
        /// Requested duration
        pub duration: i64,
    }

    #[derive(Debug, Default)]
    struct MockState {
        modes: Vec<OutputTiming>,
        formats: Vec<OutputPixelFormat>,
        enabled: Option<(OutputTiming, OutputPixelFormat)>,
        disabled: bool,
        fail_enable: bool,
        fail_schedule: bool,
        notifier: Option<CompletionNotifier>,
        scheduled: Vec<ScheduledFrame>,
        started: Option<(i64, i64)>,
        stopped: bool,
        converters_created: usize,
        buffered: Option<u32>,
        buffered_queries: usize,
    }

    /// In-memory [`VideoSink`] that records every call
    ///
    /// Clones share state, so a test can keep one clone while the
    /// scheduler owns another.
    #[derive(Debug, Clone, Default)]
    pub struct MockSink {
        state: Arc<Mutex<MockState>>,
    }

    impl MockSink {
        /// Sink offering `modes`, supporting every output format
        pub fn new(modes: Vec<OutputTiming>) -> Self {
            let sink = Self::default();
            {
                let mut state = sink.state.lock();
                state.modes = modes;
                state.formats = vec![
                    OutputPixelFormat::Yuv8,
                    OutputPixelFormat::Yuv10,
                    OutputPixelFormat::Argb8,
                    OutputPixelFormat::Bgra8,
                ];
            }
            sink
        }

        /// Restrict the formats reported as supported
        #[must_use]
        pub fn with_formats(self, formats: Vec<OutputPixelFormat>) -> Self {
            self.state.lock().formats = formats;
            self
        }

        /// Make `enable_output` fail
        #[must_use]
        pub fn failing_enable(self) -> Self {
            self.state.lock().fail_enable = true;
            self
        }

        /// Make every `schedule_frame` call fail from now on
        pub fn fail_schedule(&self, fail: bool) {
            self.state.lock().fail_schedule = fail;
        }

        /// Value reported by `buffered_frame_count`
        pub fn set_buffered(&self, count: Option<u32>) {
            self.state.lock().buffered = count;
        }

        /// Times `buffered_frame_count` was called
        pub fn buffered_queries(&self) -> usize {
            self.state.lock().buffered_queries
        }

        /// Deliver a completion through the registered notifier
        ///
        /// Returns `false` if no notifier is registered or the scheduler is gone.
        pub fn complete(&self, result: CompletionResult) -> bool {
            let notifier = self.state.lock().notifier.clone();
            notifier.is_some_and(|n| n.notify(result))
        }

        /// Frames scheduled so far
        pub fn scheduled(&self) -> Vec<ScheduledFrame> {
            self.state.lock().scheduled.clone()
        }

        /// Number of frames scheduled so far
        pub fn scheduled_count(&self) -> usize {
            self.state.lock().scheduled.len()
        }

        /// `(start_time, time_scale)` of the last successful start
        pub fn started(&self) -> Option<(i64, i64)> {
            self.state.lock().started
        }

        /// Whether scheduled output was stopped
        pub fn stopped(&self) -> bool {
            self.state.lock().stopped
        }

        /// Mode and format output was enabled with
        pub fn enabled(&self) -> Option<(OutputTiming, OutputPixelFormat)> {
            self.state.lock().enabled.clone()
        }

        /// Whether output was disabled
        pub fn disabled(&self) -> bool {
            self.state.lock().disabled
        }

        /// Whether a completion notifier is registered
        pub fn has_notifier(&self) -> bool {
            self.state.lock().notifier.is_some()
        }

        /// Conversion contexts handed out
        pub fn converters_created(&self) -> usize {
            self.state.lock().converters_created
        }
    }

    impl VideoSink for MockSink {
        fn display_modes(&self) -> Vec<OutputTiming> {
            self.state.lock().modes.clone()
        }

        fn supports_format(&self, _timing: &OutputTiming, format: OutputPixelFormat) -> bool {
            self.state.lock().formats.contains(&format)
        }

        fn enable_output(&mut self, timing: &OutputTiming, format: OutputPixelFormat) -> Result<(), SinkError> {
            let mut state = self.state.lock();
            if state.fail_enable {
                return Err(SinkError::EnableFailed("mock refused".into()));
            }
            state.enabled = Some((timing.clone(), format));
            Ok(())
        }

        fn disable_output(&mut self) -> Result<(), SinkError> {
            self.state.lock().disabled = true;
            Ok(())
        }

        fn set_completion_notifier(&mut self, notifier: Option<CompletionNotifier>) {
            self.state.lock().notifier = notifier;
        }

        fn schedule_frame(
            &mut self,
            frame: OutputFrame,
            display_time: i64,
            duration: i64,
            _time_scale: i64,
        ) -> Result<(), SinkError> {
            let mut state = self.state.lock();
            if state.fail_schedule {
                return Err(SinkError::ScheduleFailed("mock refused".into()));
            }
            state.scheduled.push(ScheduledFrame {
                frame,
                display_time,
                duration,
            });
            Ok(())
        }

        fn start_scheduled_output(&mut self, start_time: i64, time_scale: i64, _speed: f64) -> Result<(), SinkError> {
            self.state.lock().started = Some((start_time, time_scale));
            Ok(())
        }

        fn stop_scheduled_output(&mut self) -> Result<(), SinkError> {
            self.state.lock().stopped = true;
            Ok(())
        }

        fn buffered_frame_count(&self) -> Option<u32> {
            let mut state = self.state.lock();
            state.buffered_queries += 1;
            state.buffered
        }

        fn create_converter(&mut self) -> Result<Box<dyn ColorConverter>, SinkError> {
            self.state.lock().converters_created += 1;
            Ok(Box::new(SoftwareYuvConverter::new()))
        }
    }

    /// A 1080p mode at the given rate with BT.709 flags
    pub fn hd_timing(time_scale: i64, frame_duration: i64) -> OutputTiming {
        OutputTiming {
            name: format!("1080p{}", time_scale / frame_duration.max(1)),
            width: 1920,
            height: 1080,
            frame_duration,
            time_scale,
            flags: super::ModeFlags {
                rec709: true,
                ..Default::default()
            },
        }
    }
}
