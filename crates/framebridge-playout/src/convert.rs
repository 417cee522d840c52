//! Frame conversion to the sink's pixel layout
//!
//! RGB targets are a per-pixel channel permutation plus the optional
//! legal-range remap. YCbCr targets go through a BGRA8 staging frame
//! (same permutation and remap) and then the sink's colour conversion
//! context, which is created on the first YCbCr frame and kept until
//! [`FrameConverter::release`].

use framebridge_bus::PixelFormat;
use tracing::{debug, warn};

use crate::error::ConversionError;
use crate::format::{Colorspace, OutputPixelFormat, SignalRange};
use crate::frame::Frame;
use crate::sink::{ColorConverter, OutputFrame, VideoSink};

/// Lowest legal-range channel value
pub const LEGAL_MIN: u8 = 16;
/// Highest legal-range channel value
pub const LEGAL_MAX: u8 = 235;

/// Map a full-range channel value into `[16, 235]`
///
/// Computes `round(v * 219 / 255) + 16`.
pub const fn to_legal_range(v: u8) -> u8 {
    let scaled = (v as u32 * 219 + 127) / 255 + LEGAL_MIN as u32;
    if scaled > LEGAL_MAX as u32 {
        LEGAL_MAX
    } else {
        scaled as u8
    }
}

const LEGAL_LUT: [u8; 256] = {
    let mut lut = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        lut[i] = to_legal_range(i as u8);
        i += 1;
    }
    lut
};

/// Byte positions of red, green, blue and alpha in an RGB output pixel
const fn output_offsets(format: OutputPixelFormat) -> Option<[usize; 4]> {
    match format {
        OutputPixelFormat::Argb8 => Some([1, 2, 3, 0]),
        OutputPixelFormat::Bgra8 => Some([2, 1, 0, 3]),
        OutputPixelFormat::Yuv8 | OutputPixelFormat::Yuv10 => None,
    }
}

/// Reorder channels of a tightly packed frame into an RGB output format
///
/// Legal range remaps red, green and blue; alpha is copied unchanged.
pub fn convert_rows(
    src: &[u8],
    width: u32,
    height: u32,
    source: PixelFormat,
    target: OutputPixelFormat,
    range: SignalRange,
) -> Result<Vec<u8>, ConversionError> {
    let [out_r, out_g, out_b, out_a] = output_offsets(target).ok_or(ConversionError::Unsupported(target))?;

    let expected = Frame::expected_len(width, height);
    if src.len() != expected {
        return Err(ConversionError::BufferSize {
            expected,
            actual: src.len(),
        });
    }

    let offsets = source.channel_offsets();
    let legal = range == SignalRange::Legal;
    let mut dst = vec![0u8; expected];

    for (pixel, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let (mut r, mut g, mut b) = (pixel[offsets.r], pixel[offsets.g], pixel[offsets.b]);
        if legal {
            r = LEGAL_LUT[r as usize];
            g = LEGAL_LUT[g as usize];
            b = LEGAL_LUT[b as usize];
        }
        out[out_r] = r;
        out[out_g] = g;
        out[out_b] = b;
        out[out_a] = pixel[offsets.a];
    }

    Ok(dst)
}

/// Converts queued frames into the negotiated output format
pub struct FrameConverter {
    target: OutputPixelFormat,
    colorspace: Colorspace,
    range: SignalRange,
    yuv: Option<Box<dyn ColorConverter>>,
    sample_logged: bool,
}

impl std::fmt::Debug for FrameConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameConverter")
            .field("target", &self.target)
            .field("colorspace", &self.colorspace)
            .field("range", &self.range)
            .field("has_context", &self.yuv.is_some())
            .finish()
    }
}

impl FrameConverter {
    /// Create a converter for one output format
    pub fn new(target: OutputPixelFormat, colorspace: Colorspace, range: SignalRange) -> Self {
        Self {
            target,
            colorspace,
            range,
            yuv: None,
            sample_logged: false,
        }
    }

    /// Convert one frame
    ///
    /// For YCbCr targets the sink's conversion context is created on
    /// first use.
    pub fn convert(&mut self, frame: &Frame, sink: &mut dyn VideoSink) -> Result<OutputFrame, ConversionError> {
        if !self.sample_logged {
            self.sample_logged = true;
            log_sample(frame);
        }

        if !self.target.is_yuv() {
            let data = convert_rows(frame.data(), frame.width, frame.height, frame.format, self.target, self.range)?;
            return Ok(OutputFrame {
                width: frame.width,
                height: frame.height,
                row_bytes: self.target.row_bytes(frame.width),
                format: self.target,
                colorspace: None,
                data,
            });
        }

        let staging = OutputFrame {
            width: frame.width,
            height: frame.height,
            row_bytes: OutputPixelFormat::Bgra8.row_bytes(frame.width),
            format: OutputPixelFormat::Bgra8,
            colorspace: None,
            data: convert_rows(
                frame.data(),
                frame.width,
                frame.height,
                frame.format,
                OutputPixelFormat::Bgra8,
                self.range,
            )?,
        };

        if self.yuv.is_none() {
            let created = sink.create_converter().map_err(|e| {
                warn!("Sink could not create a conversion context: {}", e);
                ConversionError::NoContext(e.to_string())
            })?;
            debug!("Created {} conversion context ({})", self.target, self.colorspace);
            self.yuv = Some(created);
        }

        match self.yuv.as_mut() {
            Some(converter) => converter.convert(&staging, self.target, self.colorspace, self.range),
            None => Err(ConversionError::NoContext("context released".into())),
        }
    }

    /// Drop the conversion context, if any
    pub fn release(&mut self) {
        if self.yuv.take().is_some() {
            debug!("Released conversion context");
        }
    }
}

fn log_sample(frame: &Frame) {
    let w = frame.width as usize;
    let h = frame.height as usize;
    if w == 0 || h == 0 {
        return;
    }
    let data = frame.data();
    let pixel = |x: usize, y: usize| {
        let at = (y * w + x) * 4;
        [data[at], data[at + 1], data[at + 2], data[at + 3]]
    };
    debug!(
        "First frame sample ({}): top-left {:?}, centre {:?}, bottom-right {:?}",
        frame.format,
        pixel(0, 0),
        pixel(w / 2, h / 2),
        pixel(w - 1, h - 1)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::{hd_timing, MockSink};

    #[test]
    fn test_legal_range_bounds() {
        assert_eq!(to_legal_range(0), 16);
        assert_eq!(to_legal_range(255), 235);
        assert_eq!(to_legal_range(128), 126);
        for v in 0..=255u8 {
            let mapped = to_legal_range(v);
            assert!((LEGAL_MIN..=LEGAL_MAX).contains(&mapped), "{v} -> {mapped}");
            assert_eq!(LEGAL_LUT[v as usize], mapped);
        }
    }

    #[test]
    fn test_legal_range_is_monotonic() {
        for v in 1..=255u8 {
            assert!(to_legal_range(v) >= to_legal_range(v - 1));
        }
    }

    #[test]
    fn test_rgba_to_argb_full_range() {
        let src = [10, 20, 30, 40];
        let out = convert_rows(&src, 1, 1, PixelFormat::Rgba8, OutputPixelFormat::Argb8, SignalRange::Full)
            .expect("convert");
        assert_eq!(out, vec![40, 10, 20, 30]);
    }

    #[test]
    fn test_rgba_to_bgra_legal_range_keeps_alpha() {
        let src = [0, 255, 128, 0];
        let out = convert_rows(&src, 1, 1, PixelFormat::Rgba8, OutputPixelFormat::Bgra8, SignalRange::Legal)
            .expect("convert");
        assert_eq!(out, vec![126, 235, 16, 0]);
    }

    #[test]
    fn test_source_channel_order_respected() {
        // BGRA source: b=1, g=2, r=3, a=4
        let src = [1, 2, 3, 4];
        let out = convert_rows(&src, 1, 1, PixelFormat::Bgra8, OutputPixelFormat::Argb8, SignalRange::Full)
            .expect("convert");
        assert_eq!(out, vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_rows_reject_yuv_and_bad_length() {
        let src = [0u8; 16];
        assert_eq!(
            convert_rows(&src, 2, 2, PixelFormat::Rgba8, OutputPixelFormat::Yuv8, SignalRange::Full),
            Err(ConversionError::Unsupported(OutputPixelFormat::Yuv8))
        );
        assert_eq!(
            convert_rows(&src[..12], 2, 2, PixelFormat::Rgba8, OutputPixelFormat::Argb8, SignalRange::Full),
            Err(ConversionError::BufferSize {
                expected: 16,
                actual: 12
            })
        );
    }

    #[test]
    fn test_rgb_target_needs_no_context() {
        let mut sink = MockSink::new(vec![hd_timing(60, 1)]);
        let mut converter = FrameConverter::new(OutputPixelFormat::Argb8, Colorspace::Rec709, SignalRange::Full);
        let frame = Frame::new(vec![1, 2, 3, 4], 1, 1, PixelFormat::Rgba8, 0).expect("frame");

        let out = converter.convert(&frame, &mut sink).expect("convert");
        assert_eq!(out.data, vec![4, 1, 2, 3]);
        assert_eq!(out.colorspace, None);
        assert_eq!(sink.converters_created(), 0);
    }

    #[test]
    fn test_yuv_context_created_once_and_released() {
        let mut sink = MockSink::new(vec![hd_timing(60, 1)]);
        let mut converter = FrameConverter::new(OutputPixelFormat::Yuv8, Colorspace::Rec709, SignalRange::Legal);
        let frame = Frame::new(vec![0; 16], 2, 2, PixelFormat::Rgba8, 0).expect("frame");

        for _ in 0..3 {
            let out = converter.convert(&frame, &mut sink).expect("convert");
            assert_eq!(out.format, OutputPixelFormat::Yuv8);
            assert_eq!(out.colorspace, Some(Colorspace::Rec709));
            // Legal black
            assert_eq!(&out.data[..4], &[128, 16, 128, 16]);
        }
        assert_eq!(sink.converters_created(), 1);

        converter.release();
        converter.convert(&frame, &mut sink).expect("convert after release");
        assert_eq!(sink.converters_created(), 2, "released context is recreated");
    }

    #[test]
    fn test_yuv_full_range_staging_lands_in_studio_range() {
        let mut sink = MockSink::new(vec![hd_timing(60, 1)]);
        let mut converter = FrameConverter::new(OutputPixelFormat::Yuv8, Colorspace::Rec709, SignalRange::Full);
        let white = Frame::new(vec![255; 16], 2, 2, PixelFormat::Rgba8, 0).expect("frame");

        let out = converter.convert(&white, &mut sink).expect("convert");
        assert_eq!(&out.data[..4], &[128, 235, 128, 235]);
    }
}
