//! Ring channel configuration
//!
//! Provides the geometry a writer publishes with, using a builder pattern
//! for ergonomic construction.
//!
//! # Examples
//!
//! ```rust
//! use framebridge_bus::{ChannelConfig, PixelFormat};
//!
//! // Using builder pattern
//! let config = ChannelConfig::builder()
//!     .name("program-out")
//!     .resolution(1920, 1080)
//!     .fps(50)
//!     .pixel_format(PixelFormat::Rgba8)
//!     .slot_count(4)
//!     .build();
//!
//! // Using struct literal with defaults
//! let config = ChannelConfig {
//!     slot_count: 4,
//!     ..Default::default()
//! };
//! ```

use crate::format::{self, PixelFormat};

/// Maximum number of slots a channel may carry
pub const MAX_SLOT_COUNT: u32 = 64;

/// Configuration for creating a ring channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Shared-memory object name (default: "framebridge")
    ///
    /// A leading `/` is added if missing.
    pub name: String,

    /// Frame width in pixels (default: 1920)
    pub width: u32,

    /// Frame height in pixels (default: 1080)
    pub height: u32,

    /// Nominal producer frame rate (default: 60)
    ///
    /// Informational for readers; the channel itself does not pace writes.
    pub fps: u32,

    /// Channel order of published frames (default: RGBA8)
    pub pixel_format: PixelFormat,

    /// Number of slots (default: 5, the recommended count at 60 fps)
    ///
    /// More slots lower the chance of a slow reader observing a torn frame,
    /// at the cost of one frame of memory each. The builder falls back to
    /// [`recommended_slot_count`](crate::recommended_slot_count) for the
    /// configured rate.
    pub slot_count: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "framebridge".to_string(),
            width: 1920,
            height: 1080,
            fps: 60,
            pixel_format: PixelFormat::Rgba8,
            slot_count: crate::recommended_slot_count(60),
        }
    }
}

impl ChannelConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ChannelConfigBuilder {
        ChannelConfigBuilder::default()
    }

    /// Bytes per frame for this geometry, `None` on overflow
    pub fn frame_size(&self) -> Option<u32> {
        format::frame_size(self.width, self.height)
    }

    /// Validate configuration and return any issues
    ///
    /// Returns `Ok(())` if configuration is valid, or a list of issues.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.name.trim_start_matches('/').is_empty() {
            issues.push("name cannot be empty".to_string());
        }

        if self.width == 0 || self.height == 0 {
            issues.push("width and height must be non-zero".to_string());
        } else if self.frame_size().is_none() {
            issues.push("frame size must fit in 32 bits".to_string());
        }

        if self.fps == 0 {
            issues.push("fps must be at least 1".to_string());
        }

        if self.slot_count == 0 {
            issues.push("slot_count must be at least 1".to_string());
        }

        if self.slot_count > MAX_SLOT_COUNT {
            issues.push(format!("slot_count should not exceed {MAX_SLOT_COUNT}"));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`ChannelConfig`]
#[derive(Debug, Clone, Default)]
pub struct ChannelConfigBuilder {
    name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    pixel_format: Option<PixelFormat>,
    slot_count: Option<u32>,
}

impl ChannelConfigBuilder {
    /// Set the channel name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set frame width and height
    #[must_use]
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Set nominal frame rate
    #[must_use]
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Set frame channel order
    #[must_use]
    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    /// Set number of slots
    ///
    /// When unset, [`build`](Self::build) uses
    /// [`recommended_slot_count`](crate::recommended_slot_count) for the
    /// configured rate.
    #[must_use]
    pub fn slot_count(mut self, count: u32) -> Self {
        self.slot_count = Some(count);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ChannelConfig {
        let defaults = ChannelConfig::default();
        let fps = self.fps.unwrap_or(defaults.fps);

        ChannelConfig {
            name: self.name.unwrap_or(defaults.name),
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            fps,
            pixel_format: self.pixel_format.unwrap_or(defaults.pixel_format),
            slot_count: self
                .slot_count
                .unwrap_or_else(|| crate::recommended_slot_count(fps)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();

        assert_eq!(config.slot_count, 5);
        assert_eq!(config.pixel_format, PixelFormat::Rgba8);
        assert_eq!(config.frame_size(), Some(1920 * 1080 * 4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ChannelConfig::builder()
            .name("preview")
            .resolution(64, 64)
            .slot_count(4)
            .pixel_format(PixelFormat::Bgra8)
            .build();

        assert_eq!(config.name, "preview");
        assert_eq!((config.width, config.height), (64, 64));
        assert_eq!(config.slot_count, 4);
        assert_eq!(config.pixel_format, PixelFormat::Bgra8);
        assert_eq!(config.fps, 60);
    }

    #[test]
    fn test_builder_slot_count_follows_fps() {
        let at = |fps| ChannelConfig::builder().fps(fps).build().slot_count;
        assert_eq!(at(25), 3);
        assert_eq!(at(60), 5);
        assert_eq!(at(240), 8);
        assert_eq!(ChannelConfig::builder().build().slot_count, 5, "default 60 fps");

        let explicit = ChannelConfig::builder().fps(240).slot_count(2).build();
        assert_eq!(explicit.slot_count, 2);
    }

    #[test]
    fn test_config_validation() {
        let invalid = ChannelConfig {
            slot_count: 0,
            width: 0,
            ..Default::default()
        };
        let issues = invalid.validate().expect_err("should be invalid");
        assert_eq!(issues.len(), 2);

        let too_many = ChannelConfig {
            slot_count: MAX_SLOT_COUNT + 1,
            ..Default::default()
        };
        assert!(too_many.validate().is_err());

        let unnamed = ChannelConfig {
            name: "/".to_string(),
            ..Default::default()
        };
        assert!(unnamed.validate().is_err());
    }
}
