//! Ring channel producer/consumer example
//!
//! Creates a small channel, publishes a moving gradient for a few seconds
//! and reads it back through a second attachment, the way a consumer
//! process would.
//!
//! Run with:
//!
//! ```text
//! cargo run -p framebridge-bus --example writer
//! ```

use std::thread;
use std::time::Duration;

use framebridge_bus::{ChannelConfig, ChannelReader, ChannelWriter, PixelFormat};

fn main() -> framebridge_bus::Result<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("framebridge-bus v{}", framebridge_bus::VERSION);
    println!();

    let fps = 30;
    let config = ChannelConfig::builder()
        .name(format!("framebridge-example-{}", std::process::id()))
        .resolution(320, 180)
        .fps(fps)
        .pixel_format(PixelFormat::Rgba8)
        .build();

    let mut writer = ChannelWriter::create(&config)?;
    let reader = ChannelReader::open(writer.name())?;

    let g = reader.geometry();
    println!("Channel {}:", reader.name());
    println!("  Geometry: {}x{} {}", g.width, g.height, g.pixel_format);
    println!("  Slots: {} x {} bytes", g.slot_count, g.slot_stride);
    println!("  Mapping: {} bytes", g.total_size());
    println!();

    let mut frame = vec![0u8; g.frame_size as usize];
    let mut readback = Vec::with_capacity(frame.len());
    for n in 0..(fps * 3) {
        fill_gradient(&mut frame, g.width, n);
        writer.write(&frame, None)?;

        if let Some(view) = reader.read_latest() {
            view.copy_into(&mut readback);
            let first = readback[0];
            if n % fps == 0 {
                println!(
                    "  seq {:>3}  ts {}  first pixel red={}  torn={}",
                    view.sequence(),
                    view.timestamp_ns(),
                    first,
                    view.may_be_torn()
                );
            }
        }
        thread::sleep(Duration::from_millis(u64::from(1000 / fps)));
    }

    println!();
    println!("Published {} frames", writer.sequence());
    Ok(())
}

fn fill_gradient(frame: &mut [u8], width: u32, offset: u32) {
    for (i, px) in frame.chunks_exact_mut(4).enumerate() {
        let x = (i as u32 % width).wrapping_add(offset);
        px[0] = (x & 0xFF) as u8;
        px[1] = 0x40;
        px[2] = 0xFF - (x & 0xFF) as u8;
        px[3] = 0xFF;
    }
}
