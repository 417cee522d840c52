//! Output pixel formats, colorspace tags and signal range
//!
//! Labels accepted by the `FromStr` impls:
//!
//! | Type | Labels |
//! |------|--------|
//! | [`OutputPixelFormat`] | `8bit_yuv`/`yuv8`, `10bit_yuv`/`yuv10`, `8bit_argb`/`argb`, `8bit_bgra`/`bgra` |
//! | [`Colorspace`] | `rec601`/`bt601`, `rec709`/`bt709`, `rec2020`/`bt2020` (see [`parse_colorspace_override`] for `auto`) |
//! | [`SignalRange`] | `legal`, `full` |

use std::fmt;
use std::str::FromStr;

use crate::error::PlayoutError;

/// Pixel layout the sink expects for output frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputPixelFormat {
    /// 8-bit 4:2:2 YCbCr, `2vuy` (Cb Y0 Cr Y1)
    Yuv8,
    /// 10-bit 4:2:2 YCbCr, `v210`
    Yuv10,
    /// 8-bit A, R, G, B
    Argb8,
    /// 8-bit B, G, R, A
    Bgra8,
}

impl OutputPixelFormat {
    /// Whether the format is chroma subsampled and needs a colour conversion
    pub const fn is_yuv(self) -> bool {
        matches!(self, Self::Yuv8 | Self::Yuv10)
    }

    /// Bytes per output row for `width` pixels
    ///
    /// `v210` packs 6 pixels into 16 bytes and pads rows to 48-pixel
    /// groups of 128 bytes.
    pub const fn row_bytes(self, width: u32) -> usize {
        let w = width as usize;
        match self {
            Self::Argb8 | Self::Bgra8 => w * 4,
            Self::Yuv8 => w.div_ceil(2) * 4,
            Self::Yuv10 => w.div_ceil(48) * 128,
        }
    }

    /// Canonical label
    pub const fn label(self) -> &'static str {
        match self {
            Self::Yuv8 => "8bit_yuv",
            Self::Yuv10 => "10bit_yuv",
            Self::Argb8 => "8bit_argb",
            Self::Bgra8 => "8bit_bgra",
        }
    }
}

impl fmt::Display for OutputPixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OutputPixelFormat {
    type Err = PlayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "8bit_yuv" | "yuv8" => Ok(Self::Yuv8),
            "10bit_yuv" | "yuv10" => Ok(Self::Yuv10),
            "8bit_argb" | "argb" => Ok(Self::Argb8),
            "8bit_bgra" | "bgra" => Ok(Self::Bgra8),
            other => Err(PlayoutError::invalid_config(format!("unknown pixel format: {other}"))),
        }
    }
}

/// Colorspace tag attached to YCbCr output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Colorspace {
    /// ITU-R BT.601 (standard definition)
    Rec601,
    /// ITU-R BT.709 (high definition)
    Rec709,
    /// ITU-R BT.2020
    Rec2020,
}

impl Colorspace {
    /// Height-based default: up to 576 lines is SD, anything taller HD
    pub const fn for_height(height: u32) -> Self {
        if height > 0 && height <= 576 {
            Self::Rec601
        } else {
            Self::Rec709
        }
    }

    /// Canonical label
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rec601 => "rec601",
            Self::Rec709 => "rec709",
            Self::Rec2020 => "rec2020",
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Colorspace {
    type Err = PlayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rec601" | "bt601" => Ok(Self::Rec601),
            "rec709" | "bt709" => Ok(Self::Rec709),
            "rec2020" | "bt2020" => Ok(Self::Rec2020),
            other => Err(PlayoutError::invalid_config(format!("unknown colorspace: {other}"))),
        }
    }
}

/// Parse a colorspace override label, where `auto` means no override
pub fn parse_colorspace_override(label: &str) -> Result<Option<Colorspace>, PlayoutError> {
    if label == "auto" {
        Ok(None)
    } else {
        label.parse().map(Some)
    }
}

/// Numeric range of 8-bit output channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignalRange {
    /// 16..=235 per channel
    #[default]
    Legal,
    /// 0..=255 per channel
    Full,
}

impl fmt::Display for SignalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Legal => "legal",
            Self::Full => "full",
        })
    }
}

impl FromStr for SignalRange {
    type Err = PlayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legal" => Ok(Self::Legal),
            "full" => Ok(Self::Full),
            other => Err(PlayoutError::invalid_config(format!("unknown range: {other}"))),
        }
    }
}
