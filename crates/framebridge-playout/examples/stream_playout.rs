//! Stream playout dry run
//!
//! Feeds a short header-framed stream into a playout session backed by the
//! recording sink, plays the sink's part by completing frames at the
//! output rate, then prints what was scheduled. An optional argument
//! picks the colorspace (`auto`, `bt601`, `bt709`, `bt2020`).
//!
//! Run with:
//!
//! ```text
//! cargo run -p framebridge-playout --example stream_playout -- bt601
//! ```

use std::time::Duration;

use framebridge_playout::sink::testing::MockSink;
use framebridge_playout::{
    CancelToken, CompletionResult, ModeFlags, OutputPixelFormat, OutputTiming, PlayoutConfig, PlayoutSession,
    StreamWriter,
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 180;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("framebridge-playout v{}", framebridge_playout::VERSION);
    println!();

    let sink = MockSink::new(vec![OutputTiming {
        name: "320x180p50".into(),
        width: WIDTH,
        height: HEIGHT,
        frame_duration: 1000,
        time_scale: 50000,
        flags: ModeFlags {
            rec709: true,
            ..Default::default()
        },
    }]);

    let colorspace = std::env::args().nth(1).unwrap_or_else(|| "auto".to_string());
    let config = PlayoutConfig::builder()
        .resolution(WIDTH, HEIGHT)
        .fps(50.0)
        .pixel_format_priority(vec![OutputPixelFormat::Yuv10, OutputPixelFormat::Yuv8])
        .colorspace_label(&colorspace)?
        .build();

    let mut session = PlayoutSession::start(config, sink.clone())?;
    let plan = session.plan();
    println!("Output plan:");
    println!("  Mode: {}", plan.timing.name);
    println!("  Format: {:?}", plan.format);
    println!("  Colorspace: {:?}", plan.colorspace);
    println!();

    // Ten frames of a moving gradient, then an explicit shutdown
    let mut writer = StreamWriter::new(Vec::new());
    let mut frame = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
    for n in 0..10u32 {
        fill_gradient(&mut frame, n * 8);
        writer.write_frame(WIDTH, HEIGHT, u64::from(n), &frame).await?;
    }
    writer.write_shutdown().await?;
    let bytes = writer.into_inner();

    let end = session.run_stream(bytes.as_slice(), &CancelToken::new()).await?;
    println!("Ingestion ended: {:?}", end);

    // Complete more frames than were sent to show underrun repeats
    for _ in 0..15 {
        sink.complete(CompletionResult::Completed);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let report = session.shutdown().await?;
    println!();
    println!("Playout report:");
    println!("  Frames accepted: {}", report.ingest.frames_accepted);
    println!("  Frames scheduled: {}", report.playback.scheduled);
    println!("  Completions: {}", report.playback.completed);
    println!("  Repeats: {}", report.playback.repeated);
    println!("  Evicted: {}", report.frames_evicted);
    println!("  Final state: {:?}", report.final_state);

    if let Some(first) = sink.scheduled().first() {
        println!(
            "  First frame: {}x{} {:?}, {} bytes/row",
            first.frame.width, first.frame.height, first.frame.format, first.frame.row_bytes
        );
    }
    Ok(())
}

fn fill_gradient(frame: &mut [u8], offset: u32) {
    for (i, px) in frame.chunks_exact_mut(4).enumerate() {
        let x = (i as u32 % WIDTH).wrapping_add(offset);
        px[0] = (x & 0xFF) as u8;
        px[1] = 0x80;
        px[2] = 0xFF - (x & 0xFF) as u8;
        px[3] = 0xFF;
    }
}
