//! Paced display loop
//!
//! Presents a ring channel straight to a display surface, without the
//! playback queue or scheduler. The surface itself (window, texture) is
//! external and sits behind the [`Presenter`] trait.
//!
//! # Pacing
//!
//! ```text
//!  new sequence?
//!    no  ─▶ poll events, sleep 1 ms
//!    yes ─▶ present, poll events,
//!           deadline += interval
//!           ahead  ─▶ sleep until deadline
//!           behind ─▶ deadline = now
//! ```

use std::time::Duration;

use framebridge_bus::{ChannelReader, PixelFormat};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::DisplayConfig;
use crate::error::{PlayoutError, Result, SinkError};

/// Idle poll period while no new frame is published
const IDLE_POLL: Duration = Duration::from_millis(1);

/// What the display surface wants after handling its events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterControl {
    /// Keep presenting
    Continue,
    /// The surface was closed
    Exit,
}

/// An external display surface
pub trait Presenter: Send {
    /// Show one tightly packed RGBA8 frame
    fn present(&mut self, rgba: &[u8], width: u32, height: u32) -> std::result::Result<(), SinkError>;

    /// Handle pending window events
    fn poll_events(&mut self) -> PresenterControl;
}

/// Counters from one display run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayStats {
    /// Frames handed to the presenter
    pub frames_presented: u64,
    /// Presentations the presenter reported as failed
    pub present_failures: u64,
    /// Published sequences never presented
    pub sequences_skipped: u64,
    /// Times presentation fell behind and the deadline was reset
    pub deadline_resets: u64,
}

/// Reads a ring channel and presents each new frame at a bounded rate
#[derive(Debug)]
pub struct DisplayLoop {
    reader: ChannelReader,
    interval: Duration,
    last_sequence: u64,
}

impl DisplayLoop {
    /// Attach to the configured channel
    ///
    /// The channel must carry RGBA8 frames of exactly the configured size.
    pub fn open(config: &DisplayConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|issues| PlayoutError::invalid_config(issues.join("; ")))?;

        let reader = ChannelReader::open(&config.channel_name)?;
        reader.expect_geometry(config.width, config.height, PixelFormat::Rgba8)?;

        let interval = config.frame_interval();
        info!(
            "Displaying channel {} ({}x{}) every {:?}",
            reader.name(),
            config.width,
            config.height,
            interval
        );

        Ok(Self {
            reader,
            interval,
            last_sequence: 0,
        })
    }

    /// Present until the surface exits or `cancel` fires
    pub async fn run(&mut self, presenter: &mut dyn Presenter, cancel: &CancelToken) -> Result<DisplayStats> {
        let mut stats = DisplayStats::default();
        let mut next_frame_at = Instant::now();
        let mut pixels = Vec::new();

        while !cancel.is_cancelled() {
            let sequence = self.reader.sequence();
            if sequence == 0 || sequence == self.last_sequence {
                if presenter.poll_events() == PresenterControl::Exit {
                    break;
                }
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(IDLE_POLL) => continue,
                }
            }

            if let Some(view) = self.reader.read_latest() {
                let geometry = self.reader.geometry();
                if self.last_sequence != 0 && view.sequence() > self.last_sequence + 1 {
                    stats.sequences_skipped += view.sequence() - self.last_sequence - 1;
                }
                self.last_sequence = view.sequence();

                view.copy_into(&mut pixels);
                match presenter.present(&pixels, geometry.width, geometry.height) {
                    Ok(()) => stats.frames_presented += 1,
                    Err(e) => {
                        stats.present_failures += 1;
                        warn!("Failed to present frame {}: {}", view.sequence(), e);
                    }
                }
            }

            if presenter.poll_events() == PresenterControl::Exit {
                break;
            }

            next_frame_at += self.interval;
            let now = Instant::now();
            if next_frame_at > now {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep_until(next_frame_at) => {}
                }
            } else {
                next_frame_at = now;
                stats.deadline_resets += 1;
            }
        }

        debug!(
            "Display loop ended: presented={} skipped={} resets={}",
            stats.frames_presented, stats.sequences_skipped, stats.deadline_resets
        );
        Ok(stats)
    }
}
