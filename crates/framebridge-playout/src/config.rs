//! Playout Configuration
//!
//! Provides configuration for the playout session and the paced display
//! loop, with a builder pattern for ergonomic construction.
//!
//! # Examples
//!
//! ```rust
//! use framebridge_playout::{OutputPixelFormat, PlayoutConfig, SignalRange, SourceConfig};
//!
//! // Using builder pattern
//! let config = PlayoutConfig::builder()
//!     .resolution(1920, 1080)
//!     .fps(50.0)
//!     .source(SourceConfig::Channel { name: "program-out".into() })
//!     .pixel_format_priority(vec![OutputPixelFormat::Yuv10, OutputPixelFormat::Yuv8])
//!     .range(SignalRange::Legal)
//!     .build();
//!
//! // Colorspace from a text option, where "auto" follows the display mode
//! let config = PlayoutConfig::builder().colorspace_label("bt709")?.build();
//!
//! // Using struct literal with defaults
//! let config = PlayoutConfig {
//!     preroll_frames: 4,
//!     ..Default::default()
//! };
//! # Ok::<(), framebridge_playout::PlayoutError>(())
//! ```

use std::time::Duration;

use crate::error::PlayoutError;
use crate::format::{parse_colorspace_override, Colorspace, OutputPixelFormat, SignalRange};

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceConfig {
    /// Length-prefixed frames on a byte stream (default)
    #[default]
    Stream,
    /// A ring channel created by another process
    Channel {
        /// Channel name
        name: String,
    },
}

/// Configuration for a playout session
#[derive(Debug, Clone)]
pub struct PlayoutConfig {
    /// Frame width in pixels (default: 1920)
    pub width: u32,

    /// Frame height in pixels (default: 1080)
    pub height: u32,

    /// Output frame rate (default: 60.0)
    ///
    /// Matched against the sink's display modes within
    /// [`timing_tolerance`](Self::timing_tolerance).
    pub fps: f64,

    /// Frame source (default: stream)
    pub source: SourceConfig,

    /// Output formats to try, most preferred first (default: `[Argb8]`)
    pub pixel_format_priority: Vec<OutputPixelFormat>,

    /// Output signal range (default: legal)
    pub range: SignalRange,

    /// Colorspace to use instead of the one derived from the display mode
    /// (default: None, meaning auto)
    pub colorspace_override: Option<Colorspace>,

    /// Playback queue capacity (default: 4)
    ///
    /// Pushing past capacity drops the oldest queued frame.
    pub queue_capacity: usize,

    /// Frames handed to the sink before scheduled playback starts (default: 3)
    ///
    /// The builder falls back to
    /// [`recommended_preroll_frames`](crate::recommended_preroll_frames)
    /// for the configured rate.
    pub preroll_frames: usize,

    /// Ring channel poll interval in milliseconds (default: 1)
    pub poll_interval_ms: u64,

    /// Minimum milliseconds between completion statistics logs (default: 1000)
    pub stats_interval_ms: u64,

    /// Minimum milliseconds between buffered frame count logs (default: 2000)
    pub buffered_log_interval_ms: u64,

    /// Allowed difference between requested and display mode fps (default: 0.01)
    pub timing_tolerance: f64,
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 60.0,
            source: SourceConfig::Stream,
            pixel_format_priority: vec![OutputPixelFormat::Argb8],
            range: SignalRange::Legal,
            colorspace_override: None,
            queue_capacity: 4,
            preroll_frames: 3,
            poll_interval_ms: 1,
            stats_interval_ms: 1000,
            buffered_log_interval_ms: 2000,
            timing_tolerance: 0.01,
        }
    }
}

impl PlayoutConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> PlayoutConfigBuilder {
        PlayoutConfigBuilder::default()
    }

    /// Bytes in one tightly packed 4-channel input frame
    pub fn frame_bytes(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4
    }

    /// Ring channel poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Minimum interval between completion statistics logs
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    /// Minimum interval between buffered frame count logs
    pub fn buffered_log_interval(&self) -> Duration {
        Duration::from_millis(self.buffered_log_interval_ms)
    }

    /// Validate configuration and return any issues
    ///
    /// Returns `Ok(())` if configuration is valid, or a list of issues.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.width == 0 || self.height == 0 {
            issues.push("width and height must be non-zero".to_string());
        } else if self.frame_bytes() > u64::from(u32::MAX) {
            issues.push("frame size must fit in 32 bits".to_string());
        }

        if !self.fps.is_finite() || self.fps <= 0.0 {
            issues.push("fps must be a positive number".to_string());
        }

        if self.pixel_format_priority.is_empty() {
            issues.push("pixel_format_priority cannot be empty".to_string());
        }

        if self.queue_capacity == 0 {
            issues.push("queue_capacity must be at least 1".to_string());
        }

        if self.preroll_frames == 0 {
            issues.push("preroll_frames must be at least 1".to_string());
        }

        if self.poll_interval_ms == 0 {
            issues.push("poll_interval_ms must be at least 1".to_string());
        }

        if self.timing_tolerance.is_nan() || self.timing_tolerance < 0.0 {
            issues.push("timing_tolerance cannot be negative".to_string());
        }

        if let SourceConfig::Channel { name } = &self.source {
            if name.trim_start_matches('/').is_empty() {
                issues.push("channel name cannot be empty".to_string());
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`PlayoutConfig`]
#[derive(Debug, Clone, Default)]
pub struct PlayoutConfigBuilder {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
    source: Option<SourceConfig>,
    pixel_format_priority: Option<Vec<OutputPixelFormat>>,
    range: Option<SignalRange>,
    colorspace_override: Option<Colorspace>,
    queue_capacity: Option<usize>,
    preroll_frames: Option<usize>,
    poll_interval_ms: Option<u64>,
    stats_interval_ms: Option<u64>,
    buffered_log_interval_ms: Option<u64>,
    timing_tolerance: Option<f64>,
}

impl PlayoutConfigBuilder {
    /// Set frame width and height
    #[must_use]
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Set output frame rate
    #[must_use]
    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Set frame source
    #[must_use]
    pub fn source(mut self, source: SourceConfig) -> Self {
        self.source = Some(source);
        self
    }

    /// Set output format priority
    #[must_use]
    pub fn pixel_format_priority(mut self, formats: Vec<OutputPixelFormat>) -> Self {
        self.pixel_format_priority = Some(formats);
        self
    }

    /// Set output signal range
    #[must_use]
    pub fn range(mut self, range: SignalRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Set colorspace override
    #[must_use]
    pub fn colorspace_override(mut self, colorspace: Colorspace) -> Self {
        self.colorspace_override = Some(colorspace);
        self
    }

    /// Set colorspace override from a label such as `bt709`
    ///
    /// `auto` clears any override so the display mode decides.
    pub fn colorspace_label(mut self, label: &str) -> Result<Self, PlayoutError> {
        self.colorspace_override = parse_colorspace_override(label)?;
        Ok(self)
    }

    /// Set playback queue capacity
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Set preroll frame count
    #[must_use]
    pub fn preroll_frames(mut self, frames: usize) -> Self {
        self.preroll_frames = Some(frames);
        self
    }

    /// Set ring channel poll interval
    #[must_use]
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    /// Set statistics log interval
    #[must_use]
    pub fn stats_interval_ms(mut self, ms: u64) -> Self {
        self.stats_interval_ms = Some(ms);
        self
    }

    /// Set buffered frame count log interval
    #[must_use]
    pub fn buffered_log_interval_ms(mut self, ms: u64) -> Self {
        self.buffered_log_interval_ms = Some(ms);
        self
    }

    /// Set display mode fps tolerance
    #[must_use]
    pub fn timing_tolerance(mut self, tolerance: f64) -> Self {
        self.timing_tolerance = Some(tolerance);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> PlayoutConfig {
        let defaults = PlayoutConfig::default();
        let fps = self.fps.unwrap_or(defaults.fps);

        PlayoutConfig {
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            fps,
            source: self.source.unwrap_or(defaults.source),
            pixel_format_priority: self.pixel_format_priority.unwrap_or(defaults.pixel_format_priority),
            range: self.range.unwrap_or(defaults.range),
            colorspace_override: self.colorspace_override.or(defaults.colorspace_override),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            preroll_frames: self
                .preroll_frames
                .unwrap_or_else(|| crate::recommended_preroll_frames(fps)),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            stats_interval_ms: self.stats_interval_ms.unwrap_or(defaults.stats_interval_ms),
            buffered_log_interval_ms: self
                .buffered_log_interval_ms
                .unwrap_or(defaults.buffered_log_interval_ms),
            timing_tolerance: self.timing_tolerance.unwrap_or(defaults.timing_tolerance),
        }
    }
}

/// Environment variable holding the display loop's channel name
pub const ENV_CHANNEL_NAME: &str = "BRIDGE_FRAMEBUS_NAME";
/// Environment variable holding the expected frame width
pub const ENV_FRAME_WIDTH: &str = "BRIDGE_FRAME_WIDTH";
/// Environment variable holding the expected frame height
pub const ENV_FRAME_HEIGHT: &str = "BRIDGE_FRAME_HEIGHT";
/// Environment variable holding the presentation rate
pub const ENV_FRAME_FPS: &str = "BRIDGE_FRAME_FPS";

/// Configuration for the paced display loop
///
/// Zero and empty values mean "unset" so that [`with_env_fallback`]
/// can fill them in.
///
/// [`with_env_fallback`]: DisplayConfig::with_env_fallback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayConfig {
    /// Ring channel name
    pub channel_name: String,
    /// Expected frame width
    pub width: u32,
    /// Expected frame height
    pub height: u32,
    /// Presentation rate (default after fallback: 60)
    pub fps: u32,
}

impl DisplayConfig {
    /// Presentation rate used when neither the caller nor the environment sets one
    pub const DEFAULT_FPS: u32 = 60;

    /// Fill unset fields from `BRIDGE_FRAMEBUS_NAME`, `BRIDGE_FRAME_WIDTH`,
    /// `BRIDGE_FRAME_HEIGHT` and `BRIDGE_FRAME_FPS`
    #[must_use]
    pub fn with_env_fallback(self) -> Self {
        self.with_fallback_from(|key| std::env::var(key).ok())
    }

    /// Fill unset fields from an arbitrary key lookup
    ///
    /// Unparseable numbers count as unset. A rate still unset afterwards
    /// becomes [`DEFAULT_FPS`](Self::DEFAULT_FPS).
    #[must_use]
    pub fn with_fallback_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u32>().ok()).unwrap_or(0);

        if self.channel_name.is_empty() {
            self.channel_name = lookup(ENV_CHANNEL_NAME).unwrap_or_default();
        }
        if self.width == 0 {
            self.width = number(ENV_FRAME_WIDTH);
        }
        if self.height == 0 {
            self.height = number(ENV_FRAME_HEIGHT);
        }
        if self.fps == 0 {
            self.fps = number(ENV_FRAME_FPS);
        }
        if self.fps == 0 {
            self.fps = Self::DEFAULT_FPS;
        }
        self
    }

    /// Target time between presented frames, never below 1 ms
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.fps == 0 { Self::DEFAULT_FPS } else { self.fps };
        Duration::from_millis(u64::from((1000 / fps).max(1)))
    }

    /// Validate configuration and return any issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.channel_name.is_empty() {
            issues.push(format!("channel name required (or {ENV_CHANNEL_NAME})"));
        }
        if self.width == 0 || self.height == 0 {
            issues.push(format!(
                "width and height required (or {ENV_FRAME_WIDTH}/{ENV_FRAME_HEIGHT})"
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}
