//! Pixel format tags carried in the channel header
//!
//! Every format is 8 bits per channel, four channels, tightly packed. The
//! tag only fixes the channel order.

use std::fmt;

/// Bytes per pixel for every channel format
pub const BYTES_PER_PIXEL: usize = 4;

/// Source pixel layout of frames in a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum PixelFormat {
    /// R, G, B, A byte order
    #[default]
    Rgba8 = 1,
    /// B, G, R, A byte order
    Bgra8 = 2,
    /// A, R, G, B byte order
    Argb8 = 3,
}

impl PixelFormat {
    /// Header tag value
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Decode a header tag, `None` for values outside the enumeration
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Rgba8),
            2 => Some(Self::Bgra8),
            3 => Some(Self::Argb8),
            _ => None,
        }
    }

    /// Byte offsets of the red, green, blue and alpha channels in a pixel
    pub const fn channel_offsets(self) -> ChannelOffsets {
        match self {
            Self::Rgba8 => ChannelOffsets { r: 0, g: 1, b: 2, a: 3 },
            Self::Bgra8 => ChannelOffsets { r: 2, g: 1, b: 0, a: 3 },
            Self::Argb8 => ChannelOffsets { r: 1, g: 2, b: 3, a: 0 },
        }
    }

    /// Bytes per pixel
    pub const fn bytes_per_pixel(self) -> usize {
        BYTES_PER_PIXEL
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Rgba8 => "rgba8",
            Self::Bgra8 => "bgra8",
            Self::Argb8 => "argb8",
        };
        f.write_str(label)
    }
}

/// Channel positions within one 4-byte pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOffsets {
    pub r: usize,
    pub g: usize,
    pub b: usize,
    pub a: usize,
}

/// Size in bytes of a tightly packed frame, `None` if it overflows a header field
pub fn frame_size(width: u32, height: u32) -> Option<u32> {
    let bytes = u64::from(width) * u64::from(height) * BYTES_PER_PIXEL as u64;
    u32::try_from(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip_and_unknown() {
        for format in [PixelFormat::Rgba8, PixelFormat::Bgra8, PixelFormat::Argb8] {
            assert_eq!(PixelFormat::from_tag(format.tag()), Some(format));
        }
        assert_eq!(PixelFormat::from_tag(0), None);
        assert_eq!(PixelFormat::from_tag(4), None);
    }

    #[test]
    fn test_channel_offsets_are_permutations() {
        for format in [PixelFormat::Rgba8, PixelFormat::Bgra8, PixelFormat::Argb8] {
            let o = format.channel_offsets();
            let mut seen = [o.r, o.g, o.b, o.a];
            seen.sort_unstable();
            assert_eq!(seen, [0, 1, 2, 3], "{format}");
        }
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(frame_size(64, 64), Some(16384));
        assert_eq!(frame_size(1920, 1080), Some(8_294_400));
        assert_eq!(frame_size(u32::MAX, 2), None);
    }
}
