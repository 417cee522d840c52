//! End-to-end ring channel behaviour through real shared memory

use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};

use framebridge_bus::{BusError, ChannelConfig, ChannelReader, ChannelWriter, PixelFormat};
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("fb-ring-{tag}-{}-{n}", std::process::id())
}

fn create(name: &str, width: u32, height: u32, slots: u32) -> ChannelWriter {
    let config = ChannelConfig::builder()
        .name(name)
        .resolution(width, height)
        .fps(30)
        .pixel_format(PixelFormat::Rgba8)
        .slot_count(slots)
        .build();
    ChannelWriter::create(&config).expect("create channel")
}

/// Frame whose every byte identifies the frame it belongs to
fn patterned(len: usize, index: u8) -> Vec<u8> {
    (0..len).map(|i| index.wrapping_mul(31).wrapping_add(i as u8)).collect()
}

/// Create a shared-memory object directly, bypassing the writer
fn foreign_object(name: &str, contents: &[u8]) -> File {
    let fd = shm_open(
        name,
        OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
        Mode::S_IRUSR | Mode::S_IWUSR,
    )
    .expect("shm_open");
    let mut file = File::from(fd);
    file.write_all(contents).expect("write contents");
    file
}

#[test]
fn latest_frame_after_five_writes() {
    let name = unique_name("latest");
    let mut writer = create(&name, 64, 64, 4);
    let reader = ChannelReader::open(&name).expect("open");
    let frame_size = 64 * 64 * 4;

    for i in 1..=5u8 {
        writer.write(&patterned(frame_size, i), Some(u64::from(i) * 1000)).expect("write");
    }

    let view = reader.read_latest().expect("frame published");
    assert_eq!(view.sequence(), 5);
    assert_eq!(view.timestamp_ns(), 5000);
    assert_eq!(view.copy_to_vec(), patterned(frame_size, 5));

    // Without further writes repeated reads return the same frame.
    let again = reader.read_latest().expect("frame published");
    assert_eq!(again.sequence(), 5);
    assert_eq!(again.copy_to_vec(), view.copy_to_vec());
}

#[test]
fn read_before_first_write_is_none() {
    let name = unique_name("none");
    let _writer = create(&name, 16, 16, 3);
    let reader = ChannelReader::open(&name).expect("open");

    assert!(reader.read_latest().is_none());
    assert_eq!(reader.sequence(), 0);
}

#[test]
fn wraparound_keeps_latest_in_right_slot() {
    let name = unique_name("wrap");
    let mut writer = create(&name, 8, 8, 3);
    let reader = ChannelReader::open(&name).expect("open");
    let frame_size = 8 * 8 * 4;

    for i in 1..=10u8 {
        writer.write(&patterned(frame_size, i), None).expect("write");
        let view = reader.read_latest().expect("frame");
        assert_eq!(view.sequence(), u64::from(i));
        assert_eq!(view.copy_to_vec(), patterned(frame_size, i), "frame {i}");
        assert!(!view.may_be_torn());
    }
    assert_eq!(reader.geometry().slot_for_sequence(10), 0);
}

#[test]
fn reader_sees_writer_geometry() {
    let name = unique_name("geometry");
    let _writer = create(&name, 320, 180, 5);
    let reader = ChannelReader::open(&format!("/{name}")).expect("open with leading slash");

    let g = reader.geometry();
    assert_eq!((g.width, g.height), (320, 180));
    assert_eq!(g.fps, 30);
    assert_eq!(g.pixel_format, PixelFormat::Rgba8);
    assert_eq!(g.frame_size, 320 * 180 * 4);
    assert_eq!(g.slot_count, 5);
    assert_eq!(g.version, 1);
    assert!(reader.expect_geometry(320, 180, PixelFormat::Rgba8).is_ok());
}

#[test]
fn multiple_readers_share_one_writer() {
    let name = unique_name("multi");
    let mut writer = create(&name, 4, 4, 2);
    let first = ChannelReader::open(&name).expect("open");
    let second = ChannelReader::open(&name).expect("open");

    writer.write(&[9u8; 64], None).expect("write");

    assert_eq!(first.read_latest().expect("frame").copy_to_vec(), vec![9u8; 64]);
    assert_eq!(second.read_latest().expect("frame").copy_to_vec(), vec![9u8; 64]);
}

#[test]
fn open_missing_channel() {
    let name = unique_name("missing");
    let err = ChannelReader::open(&name).expect_err("nothing created");
    assert!(matches!(err, BusError::ChannelNotFound(_)));
}

#[test]
fn open_foreign_object_is_invalid() {
    let name = format!("/{}", unique_name("foreign"));
    let _file = foreign_object(&name, &[0xAB; 4096]);

    let err = ChannelReader::open(&name).expect_err("foreign memory");
    shm_unlink(name.as_str()).expect("unlink");
    assert!(matches!(err, BusError::ChannelInvalid(_)), "{err}");
}

#[test]
fn open_truncated_object_is_invalid() {
    let name = format!("/{}", unique_name("short"));
    let _file = foreign_object(&name, &[0u8; 16]);

    let err = ChannelReader::open(&name).expect_err("too small");
    shm_unlink(name.as_str()).expect("unlink");
    assert!(matches!(err, BusError::ChannelInvalid(_)), "{err}");
}

#[test]
fn header_claiming_more_slots_than_mapped_is_invalid() {
    let name = format!("/{}", unique_name("slots"));
    // Valid magic and header size, but 64 slots of 1 MiB each in 4 KiB.
    let mut header = vec![0u8; 4096];
    header[0x00..0x04].copy_from_slice(&0x4647_5242u32.to_le_bytes());
    header[0x04..0x06].copy_from_slice(&1u16.to_le_bytes());
    header[0x08..0x0C].copy_from_slice(&128u32.to_le_bytes());
    header[0x0C..0x10].copy_from_slice(&512u32.to_le_bytes());
    header[0x10..0x14].copy_from_slice(&512u32.to_le_bytes());
    header[0x14..0x18].copy_from_slice(&30u32.to_le_bytes());
    header[0x18..0x1C].copy_from_slice(&1u32.to_le_bytes());
    header[0x1C..0x20].copy_from_slice(&(512u32 * 512 * 4).to_le_bytes());
    header[0x20..0x24].copy_from_slice(&64u32.to_le_bytes());
    header[0x24..0x28].copy_from_slice(&(512u32 * 512 * 4).to_le_bytes());
    let _file = foreign_object(&name, &header);

    let err = ChannelReader::open(&name).expect_err("slots exceed mapping");
    shm_unlink(name.as_str()).expect("unlink");
    assert!(matches!(err, BusError::ChannelInvalid(_)), "{err}");
}

#[test]
fn hand_built_header_is_accepted() {
    let name = format!("/{}", unique_name("manual"));
    let mut image = vec![0u8; 128 + 2 * 16];
    image[0x00..0x04].copy_from_slice(b"BRGF");
    image[0x04..0x06].copy_from_slice(&1u16.to_le_bytes());
    image[0x08..0x0C].copy_from_slice(&128u32.to_le_bytes());
    image[0x0C..0x10].copy_from_slice(&2u32.to_le_bytes());
    image[0x10..0x14].copy_from_slice(&2u32.to_le_bytes());
    image[0x14..0x18].copy_from_slice(&25u32.to_le_bytes());
    image[0x18..0x1C].copy_from_slice(&3u32.to_le_bytes());
    image[0x1C..0x20].copy_from_slice(&16u32.to_le_bytes());
    image[0x20..0x24].copy_from_slice(&2u32.to_le_bytes());
    image[0x24..0x28].copy_from_slice(&16u32.to_le_bytes());
    // Sequence 2 lives in slot 1.
    image[0x28..0x30].copy_from_slice(&2u64.to_le_bytes());
    image[128 + 16..].copy_from_slice(&[0x5A; 16]);
    let _file = foreign_object(&name, &image);

    let reader = ChannelReader::open(&name).expect("layout accepted");
    let bytes = reader.read_latest().map(|v| v.copy_to_vec());
    let format = reader.geometry().pixel_format;
    drop(reader);
    shm_unlink(name.as_str()).expect("unlink");

    assert_eq!(format, PixelFormat::Argb8);
    assert_eq!(bytes, Some(vec![0x5A; 16]));
}
