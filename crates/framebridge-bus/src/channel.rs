//! Ring channel writer and reader
//!
//! A channel is one shared-memory object holding a 128-byte descriptor and
//! `slot_count` frame slots. Exactly one [`ChannelWriter`] publishes; any
//! number of [`ChannelReader`]s in other processes fetch the newest frame.
//!
//! # Publication protocol
//!
//! ```text
//! writer                                   reader
//! ──────                                   ──────
//! slot = seq % slot_count                  seq = load(sequence, Acquire)
//! copy frame into slot                     seq == 0 → nothing published yet
//! store(last_write_ns, Relaxed)            slot = (seq - 1) % slot_count
//! store(sequence, seq + 1, Release) ─────▶ read slot
//! ```
//!
//! The release/acquire pair guarantees a reader that observes sequence `S`
//! also observes the completed write of frame `S`. It does not stop the
//! writer from lapping a slow reader: once the writer has advanced
//! `slot_count - 1` more frames it starts overwriting the slot being read.
//! Consumers that care re-check with [`FrameView::may_be_torn`] after
//! copying. The channel itself never does.

use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, trace};

use crate::config::ChannelConfig;
use crate::error::{BusError, Result};
use crate::format::PixelFormat;
use crate::layout::{ChannelGeometry, ChannelHeader, HeaderFields};
use crate::shm::{shm_name, SharedMapping};

/// The single publishing side of a channel
///
/// Dropping the writer unmaps the memory and unlinks the channel name.
/// Readers that are already attached keep their mapping.
#[derive(Debug)]
pub struct ChannelWriter {
    mapping: SharedMapping,
    geometry: ChannelGeometry,
    published: u64,
}

impl ChannelWriter {
    /// Create and initialise a new channel
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The configuration is invalid
    /// - A channel with the same name already exists
    /// - The shared-memory object cannot be sized or mapped
    pub fn create(config: &ChannelConfig) -> Result<Self> {
        if let Err(issues) = config.validate() {
            return Err(BusError::geometry(issues.join(", ")));
        }
        let name = shm_name(&config.name)?;
        let geometry = ChannelGeometry::new(
            config.width,
            config.height,
            config.fps,
            config.pixel_format,
            config.slot_count,
        )?;

        let mapping = SharedMapping::create(&name, geometry.total_size())?;

        let header = mapping.as_ptr().cast::<ChannelHeader>();
        // SAFETY: the mapping is at least HEADER_SIZE bytes, page aligned,
        // and freshly created, so no reader can have validated it yet.
        unsafe {
            std::ptr::write(
                header,
                ChannelHeader {
                    fields: geometry.to_fields(),
                    sequence: 0.into(),
                    last_write_ns: 0.into(),
                    reserved: [0; 72],
                },
            );
        }

        info!(
            "Created channel {} ({}x{} {} @ {} fps, {} slots of {} bytes)",
            name,
            geometry.width,
            geometry.height,
            geometry.pixel_format,
            geometry.fps,
            geometry.slot_count,
            geometry.slot_stride
        );

        Ok(Self {
            mapping,
            geometry,
            published: 0,
        })
    }

    /// Publish one frame
    ///
    /// Copies `frame` into slot `sequence % slot_count`, records the
    /// timestamp (current wall-clock time when `None`), then advances the
    /// sequence with release ordering. Returns the new sequence number.
    pub fn write(&mut self, frame: &[u8], timestamp_ns: Option<u64>) -> Result<u64> {
        let frame_size = self.geometry.frame_size as usize;
        if frame.len() != frame_size {
            return Err(BusError::FrameSizeMismatch {
                expected: frame_size,
                actual: frame.len(),
            });
        }

        let slot = (self.published % u64::from(self.geometry.slot_count)) as u32;
        let offset = self.geometry.slot_offset(slot);
        // SAFETY: `offset + frame_size` lies within the mapping because the
        // mapping was sized from this geometry; the source is a distinct
        // heap/stack buffer so the regions cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(frame.as_ptr(), self.mapping.as_ptr().add(offset), frame_size);
        }

        self.published += 1;
        let published = self.published;
        let header = self.header();
        header
            .last_write_ns
            .store(timestamp_ns.unwrap_or_else(now_ns), Ordering::Relaxed);
        header.sequence.store(published, Ordering::Release);

        trace!("Published sequence {} into slot {}", self.published, slot);
        Ok(self.published)
    }

    /// Number of frames published so far
    pub fn sequence(&self) -> u64 {
        self.published
    }

    /// Geometry written into the header
    pub fn geometry(&self) -> &ChannelGeometry {
        &self.geometry
    }

    /// Normalised shared-memory name
    pub fn name(&self) -> &str {
        self.mapping.name()
    }

    fn header(&self) -> &ChannelHeader {
        // SAFETY: the header was initialised in `create` and lives as long
        // as the mapping; only its atomics are mutated afterwards.
        unsafe { &*self.mapping.as_ptr().cast::<ChannelHeader>() }
    }
}

/// A read-only attachment to an existing channel
///
/// Readers never store into the mapping. Geometry is snapshotted and
/// validated once at open; afterwards only the sequence and timestamp are
/// loaded.
#[derive(Debug)]
pub struct ChannelReader {
    mapping: SharedMapping,
    geometry: ChannelGeometry,
}

impl ChannelReader {
    /// Attach to a channel created by another process
    ///
    /// # Errors
    ///
    /// - [`BusError::ChannelNotFound`] if no backing object exists
    /// - [`BusError::ChannelInvalid`] if magic, header size or slot layout
    ///   do not match this crate's binary layout
    pub fn open(name: &str) -> Result<Self> {
        let name = shm_name(name)?;
        let mapping = SharedMapping::open(&name)?;

        let header = mapping.as_ptr().cast::<ChannelHeader>();
        // SAFETY: `SharedMapping::open` guarantees at least HEADER_SIZE bytes.
        // A volatile copy avoids holding a reference to memory another
        // process may still be initialising.
        let fields: HeaderFields = unsafe { std::ptr::read_volatile(std::ptr::addr_of!((*header).fields)) };
        let geometry = ChannelGeometry::from_fields(&fields, mapping.len())?;

        debug!(
            "Opened channel {} ({}x{} {}, {} slots, version {})",
            name, geometry.width, geometry.height, geometry.pixel_format, geometry.slot_count, geometry.version
        );

        Ok(Self { mapping, geometry })
    }

    /// Check the channel carries frames of the expected shape
    ///
    /// Consumers call this right after [`open`](Self::open); a mismatch is
    /// a setup error, not something to recover from per frame.
    pub fn expect_geometry(&self, width: u32, height: u32, pixel_format: PixelFormat) -> Result<()> {
        let g = &self.geometry;
        let expected_bytes = crate::format::frame_size(width, height);
        if g.width != width || g.height != height || Some(g.frame_size) != expected_bytes {
            return Err(BusError::invalid(format!(
                "geometry mismatch: expected {width}x{height} ({} bytes), channel is {}x{} ({} bytes)",
                expected_bytes.unwrap_or(0),
                g.width,
                g.height,
                g.frame_size
            )));
        }
        if g.pixel_format != pixel_format {
            return Err(BusError::invalid(format!(
                "pixel format mismatch: expected {pixel_format}, channel is {}",
                g.pixel_format
            )));
        }
        Ok(())
    }

    /// Current publish count (acquire load)
    pub fn sequence(&self) -> u64 {
        self.header().sequence.load(Ordering::Acquire)
    }

    /// View of the newest published frame, `None` before the first write
    pub fn read_latest(&self) -> Option<FrameView<'_>> {
        let sequence = self.sequence();
        if sequence == 0 {
            return None;
        }
        let slot = self.geometry.slot_for_sequence(sequence);
        let timestamp_ns = self.header().last_write_ns.load(Ordering::Relaxed);
        Some(FrameView {
            reader: self,
            offset: self.geometry.slot_offset(slot),
            sequence,
            timestamp_ns,
        })
    }

    /// Geometry read from the header at open
    pub fn geometry(&self) -> &ChannelGeometry {
        &self.geometry
    }

    /// Normalised shared-memory name
    pub fn name(&self) -> &str {
        self.mapping.name()
    }

    fn header(&self) -> &ChannelHeader {
        // SAFETY: validated at open; the header outlives `self.mapping`'s
        // borrows and only its atomic fields are accessed by reference.
        unsafe { &*self.mapping.as_ptr().cast::<ChannelHeader>() }
    }
}

/// A frame as seen in a reader's mapping
///
/// The underlying bytes can still be overwritten by the writer, so the
/// view never lends them out as a slice. Copy them out, then call
/// [`may_be_torn`](Self::may_be_torn) if a torn frame must be rejected.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    reader: &'a ChannelReader,
    offset: usize,
    sequence: u64,
    timestamp_ns: u64,
}

impl FrameView<'_> {
    /// Sequence number this view was taken at
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Timestamp stored with the newest write at the time of the view
    ///
    /// Loaded after the sequence, so under concurrent writes it may belong
    /// to a slightly newer frame.
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Bytes a copy of this frame occupies
    pub fn frame_size(&self) -> usize {
        self.reader.geometry.frame_size as usize
    }

    /// Copy the frame into a new buffer
    pub fn copy_to_vec(&self) -> Vec<u8> {
        let mut dst = Vec::new();
        self.copy_into(&mut dst);
        dst
    }

    /// Copy the frame into `dst`, resizing it to the frame size
    ///
    /// Lets a polling consumer reuse one buffer across frames.
    pub fn copy_into(&self, dst: &mut Vec<u8>) {
        let len = self.frame_size();
        dst.clear();
        dst.resize(len, 0);
        // SAFETY: offset and frame_size were validated against the mapping
        // length at open and `dst` holds `len` bytes. The source is only
        // read through a raw pointer, never a reference, because the
        // producer process may be writing the same slot.
        unsafe {
            std::ptr::copy_nonoverlapping(self.reader.mapping.as_ptr().add(self.offset), dst.as_mut_ptr(), len);
        }
    }

    /// Whether the writer may have overwritten this slot since the view
    /// was taken
    ///
    /// The writer fills slot `s % slot_count` while the sequence still reads
    /// `s`. The slot behind this view is only reused once the sequence has
    /// advanced `slot_count - 1` further, so anything closer is intact.
    /// With a single slot every concurrent write lands in the viewed slot.
    pub fn may_be_torn(&self) -> bool {
        let current = self.reader.sequence();
        let advanced = current.saturating_sub(self.sequence);
        advanced + 2 > u64::from(self.reader.geometry.slot_count)
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_name(tag: &str) -> String {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("fb-unit-{tag}-{}-{n}", std::process::id())
    }

    fn config(name: &str, slots: u32) -> ChannelConfig {
        ChannelConfig::builder()
            .name(name)
            .resolution(4, 2)
            .slot_count(slots)
            .build()
    }

    #[test]
    fn test_read_before_write_is_empty() {
        let name = unique_name("empty");
        let _writer = ChannelWriter::create(&config(&name, 2)).expect("create");
        let reader = ChannelReader::open(&name).expect("open");

        assert_eq!(reader.sequence(), 0);
        assert!(reader.read_latest().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let name = unique_name("rw");
        let mut writer = ChannelWriter::create(&config(&name, 2)).expect("create");
        let reader = ChannelReader::open(&name).expect("open");

        let frame = vec![7u8; 32];
        assert_eq!(writer.write(&frame, Some(1234)).expect("write"), 1);

        let view = reader.read_latest().expect("frame");
        assert_eq!(view.sequence(), 1);
        assert_eq!(view.timestamp_ns(), 1234);
        assert_eq!(view.copy_to_vec(), frame);
    }

    #[test]
    fn test_copy_into_reuses_buffer() {
        let name = unique_name("into");
        let mut writer = ChannelWriter::create(&config(&name, 2)).expect("create");
        let reader = ChannelReader::open(&name).expect("open");

        let mut buffer = vec![0xFF; 3];
        writer.write(&[1u8; 32], None).expect("write");
        reader.read_latest().expect("frame").copy_into(&mut buffer);
        assert_eq!(buffer, vec![1u8; 32]);

        writer.write(&[2u8; 32], None).expect("write");
        let view = reader.read_latest().expect("frame");
        assert_eq!(view.frame_size(), 32);
        view.copy_into(&mut buffer);
        assert_eq!(buffer, vec![2u8; 32]);
    }

    #[test]
    fn test_write_rejects_wrong_size() {
        let name = unique_name("size");
        let mut writer = ChannelWriter::create(&config(&name, 2)).expect("create");

        let err = writer.write(&[0u8; 31], None).expect_err("short frame");
        assert!(matches!(err, BusError::FrameSizeMismatch { expected: 32, actual: 31 }));
        assert_eq!(writer.sequence(), 0);
    }

    #[test]
    fn test_duplicate_create_is_rejected() {
        let name = unique_name("dup");
        let _writer = ChannelWriter::create(&config(&name, 2)).expect("create");
        assert!(matches!(
            ChannelWriter::create(&config(&name, 2)),
            Err(BusError::ChannelExists(_))
        ));
    }

    #[test]
    fn test_drop_unlinks_name() {
        let name = unique_name("unlink");
        let writer = ChannelWriter::create(&config(&name, 2)).expect("create");
        let reader = ChannelReader::open(&name).expect("open");
        drop(writer);

        assert!(matches!(ChannelReader::open(&name), Err(BusError::ChannelNotFound(_))));
        // The existing attachment keeps its mapping.
        assert_eq!(reader.sequence(), 0);
    }

    #[test]
    fn test_torn_check_depends_on_slot_count() {
        let name = unique_name("torn");
        let mut writer = ChannelWriter::create(&config(&name, 3)).expect("create");
        let reader = ChannelReader::open(&name).expect("open");
        let frame = vec![1u8; 32];

        writer.write(&frame, None).expect("write");
        let view = reader.read_latest().expect("frame");
        assert!(!view.may_be_torn());

        writer.write(&frame, None).expect("write");
        assert!(!view.may_be_torn(), "writer is filling a different slot");

        writer.write(&frame, None).expect("write");
        assert!(view.may_be_torn(), "next write would reuse the viewed slot");
    }

    #[test]
    fn test_expect_geometry() {
        let name = unique_name("geom");
        let _writer = ChannelWriter::create(&config(&name, 2)).expect("create");
        let reader = ChannelReader::open(&name).expect("open");

        assert!(reader.expect_geometry(4, 2, PixelFormat::Rgba8).is_ok());
        assert!(reader.expect_geometry(2, 4, PixelFormat::Rgba8).is_err());
        assert!(reader.expect_geometry(4, 2, PixelFormat::Bgra8).is_err());
    }
}
