//! Binary layout of the channel descriptor
//!
//! ```text
//! offset  size  field
//! 0x00    4     magic           "BRGF" read as little-endian u32
//! 0x04    2     version
//! 0x06    2     flags
//! 0x08    4     header_size     always 128
//! 0x0C    4     width
//! 0x10    4     height
//! 0x14    4     fps
//! 0x18    4     pixel_format    see PixelFormat tags
//! 0x1C    4     frame_size
//! 0x20    4     slot_count
//! 0x24    4     slot_stride
//! 0x28    8     sequence        publish counter, 0 = nothing published
//! 0x30    8     last_write_ns
//! 0x38    72    reserved
//! 0x80          slot 0, slot 1, ... each slot_stride bytes
//! ```
//!
//! All fields are little-endian. The header is accessed in place, so the
//! crate only builds for little-endian targets.

use std::sync::atomic::AtomicU64;

use crate::error::{BusError, Result};
use crate::format::{self, PixelFormat};

#[cfg(not(target_endian = "little"))]
compile_error!("framebridge-bus maps the channel header in place and requires a little-endian target");

/// Magic value identifying a channel ("BRGF" in little-endian byte order)
pub const CHANNEL_MAGIC: u32 = 0x4647_5242;

/// Layout version written by this crate
pub const CHANNEL_VERSION: u16 = 1;

/// Size of the descriptor preceding the slots
pub const HEADER_SIZE: usize = 128;

/// Immutable descriptor fields, written once by the creator
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeaderFields {
    pub(crate) magic: u32,
    pub(crate) version: u16,
    pub(crate) flags: u16,
    pub(crate) header_size: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) fps: u32,
    pub(crate) pixel_format: u32,
    pub(crate) frame_size: u32,
    pub(crate) slot_count: u32,
    pub(crate) slot_stride: u32,
}

/// The full 128-byte descriptor as it sits in shared memory
#[repr(C)]
pub(crate) struct ChannelHeader {
    pub(crate) fields: HeaderFields,
    pub(crate) sequence: AtomicU64,
    pub(crate) last_write_ns: AtomicU64,
    pub(crate) reserved: [u8; 72],
}

const _: () = assert!(std::mem::size_of::<ChannelHeader>() == HEADER_SIZE);
const _: () = assert!(std::mem::offset_of!(ChannelHeader, sequence) == 0x28);
const _: () = assert!(std::mem::offset_of!(ChannelHeader, last_write_ns) == 0x30);
const _: () = assert!(std::mem::offset_of!(ChannelHeader, reserved) == 0x38);

/// Geometry of a channel as described by its header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelGeometry {
    /// Layout version found in the header
    pub version: u16,
    /// Flag bits (currently always zero)
    pub flags: u16,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Nominal producer frame rate
    pub fps: u32,
    /// Channel order of the frames
    pub pixel_format: PixelFormat,
    /// Bytes per frame
    pub frame_size: u32,
    /// Number of slots in the ring
    pub slot_count: u32,
    /// Distance in bytes between consecutive slots
    pub slot_stride: u32,
}

impl ChannelGeometry {
    /// Build geometry for a new channel
    pub(crate) fn new(
        width: u32,
        height: u32,
        fps: u32,
        pixel_format: PixelFormat,
        slot_count: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BusError::geometry(format!("{width}x{height} has no pixels")));
        }
        if slot_count == 0 {
            return Err(BusError::geometry("slot_count must be at least 1"));
        }
        let frame_size = format::frame_size(width, height)
            .ok_or_else(|| BusError::geometry(format!("{width}x{height} frame exceeds 4 GiB")))?;
        let geometry = Self {
            version: CHANNEL_VERSION,
            flags: 0,
            width,
            height,
            fps,
            pixel_format,
            frame_size,
            slot_count,
            slot_stride: frame_size,
        };
        // Reject sizes that cannot be mapped on this host.
        geometry
            .checked_total_size()
            .ok_or_else(|| BusError::geometry("channel size overflows the address space"))?;
        Ok(geometry)
    }

    /// Bytes needed for header plus all slots
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.slot_count as usize * self.slot_stride as usize
    }

    fn checked_total_size(&self) -> Option<usize> {
        (self.slot_count as usize)
            .checked_mul(self.slot_stride as usize)?
            .checked_add(HEADER_SIZE)
    }

    /// Byte offset of a slot from the start of the mapping
    pub fn slot_offset(&self, slot: u32) -> usize {
        HEADER_SIZE + slot as usize * self.slot_stride as usize
    }

    /// Slot holding the frame published as `sequence` (1-based)
    pub fn slot_for_sequence(&self, sequence: u64) -> u32 {
        debug_assert!(sequence > 0);
        ((sequence - 1) % u64::from(self.slot_count)) as u32
    }

    pub(crate) fn to_fields(self) -> HeaderFields {
        HeaderFields {
            magic: CHANNEL_MAGIC,
            version: self.version,
            flags: self.flags,
            header_size: HEADER_SIZE as u32,
            width: self.width,
            height: self.height,
            fps: self.fps,
            pixel_format: self.pixel_format.tag(),
            frame_size: self.frame_size,
            slot_count: self.slot_count,
            slot_stride: self.slot_stride,
        }
    }

    /// Validate header fields read from a mapping of `mapped_len` bytes
    pub(crate) fn from_fields(fields: &HeaderFields, mapped_len: usize) -> Result<Self> {
        if fields.magic != CHANNEL_MAGIC {
            return Err(BusError::invalid(format!("bad magic 0x{:08x}", fields.magic)));
        }
        if fields.header_size as usize != HEADER_SIZE {
            return Err(BusError::invalid(format!(
                "header_size {} (expected {HEADER_SIZE})",
                fields.header_size
            )));
        }
        let pixel_format = PixelFormat::from_tag(fields.pixel_format)
            .ok_or_else(|| BusError::invalid(format!("unknown pixel format tag {}", fields.pixel_format)))?;
        if fields.slot_count == 0 {
            return Err(BusError::invalid("slot_count is zero"));
        }
        if fields.slot_stride < fields.frame_size {
            return Err(BusError::invalid(format!(
                "slot_stride {} smaller than frame_size {}",
                fields.slot_stride, fields.frame_size
            )));
        }

        let geometry = Self {
            version: fields.version,
            flags: fields.flags,
            width: fields.width,
            height: fields.height,
            fps: fields.fps,
            pixel_format,
            frame_size: fields.frame_size,
            slot_count: fields.slot_count,
            slot_stride: fields.slot_stride,
        };
        match geometry.checked_total_size() {
            Some(needed) if needed <= mapped_len => Ok(geometry),
            Some(needed) => Err(BusError::invalid(format!(
                "mapping is {mapped_len} bytes, header describes {needed}"
            ))),
            None => Err(BusError::invalid("slot area overflows the address space")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> ChannelGeometry {
        ChannelGeometry::new(64, 64, 60, PixelFormat::Rgba8, 4).expect("geometry")
    }

    #[test]
    fn test_total_size() {
        let g = geometry();
        assert_eq!(g.frame_size, 64 * 64 * 4);
        assert_eq!(g.slot_stride, g.frame_size);
        assert_eq!(g.total_size(), 128 + 4 * 16384);
        assert_eq!(g.slot_offset(0), 128);
        assert_eq!(g.slot_offset(3), 128 + 3 * 16384);
    }

    #[test]
    fn test_slot_for_sequence_wraps() {
        let g = geometry();
        assert_eq!(g.slot_for_sequence(1), 0);
        assert_eq!(g.slot_for_sequence(4), 3);
        assert_eq!(g.slot_for_sequence(5), 0);
        assert_eq!(g.slot_for_sequence(10), 1);
    }

    #[test]
    fn test_fields_roundtrip() {
        let g = geometry();
        let fields = g.to_fields();
        assert_eq!(fields.magic, CHANNEL_MAGIC);
        assert_eq!(fields.header_size, 128);
        assert_eq!(ChannelGeometry::from_fields(&fields, g.total_size()).expect("valid"), g);
    }

    #[test]
    fn test_rejects_bad_magic_and_header_size() {
        let g = geometry();
        let mut fields = g.to_fields();
        fields.magic = 0xdead_beef;
        assert!(matches!(
            ChannelGeometry::from_fields(&fields, g.total_size()),
            Err(BusError::ChannelInvalid(_))
        ));

        let mut fields = g.to_fields();
        fields.header_size = 64;
        assert!(ChannelGeometry::from_fields(&fields, g.total_size()).is_err());
    }

    #[test]
    fn test_rejects_short_mapping_and_bad_slots() {
        let g = geometry();
        assert!(ChannelGeometry::from_fields(&g.to_fields(), g.total_size() - 1).is_err());

        let mut fields = g.to_fields();
        fields.slot_count = 0;
        assert!(ChannelGeometry::from_fields(&fields, g.total_size()).is_err());

        let mut fields = g.to_fields();
        fields.slot_stride = fields.frame_size - 4;
        assert!(ChannelGeometry::from_fields(&fields, g.total_size()).is_err());

        let mut fields = g.to_fields();
        fields.pixel_format = 9;
        assert!(ChannelGeometry::from_fields(&fields, g.total_size()).is_err());
    }

    #[test]
    fn test_new_rejects_empty_geometry() {
        assert!(ChannelGeometry::new(0, 10, 30, PixelFormat::Rgba8, 2).is_err());
        assert!(ChannelGeometry::new(10, 10, 30, PixelFormat::Rgba8, 0).is_err());
    }
}
