//! YCbCr Output Conversion
//!
//! Software conversion from BGRA8 staging frames to the packed 4:2:2
//! layouts video outputs expect. Sinks without a device-side converter
//! get [`SoftwareYuvConverter`] from the default
//! [`VideoSink::create_converter`](crate::sink::VideoSink::create_converter).
//!
//! # Supported Formats
//!
//! - **8-bit 4:2:2** (`2vuy`): Cb Y0 Cr Y1 per pixel pair
//! - **10-bit 4:2:2** (`v210`): 6 pixels per 16 bytes, rows padded to 128 bytes
//!
//! # Signal range
//!
//! YCbCr output is always studio swing (Y in 16..=235, Cb/Cr in 16..=240).
//! Legal-range staging (RGB in 16..=235) keeps its luma as is and only has
//! chroma widened by 224/219. Full-range staging is scaled down, luma by
//! 219/255 plus the 16 offset and chroma by 224/255.
//!
//! # Performance
//!
//! These are reference implementations prioritizing correctness over speed.
//! Sinks with a hardware converter should return it from
//! `create_converter` instead.

use crate::error::ConversionError;
use crate::format::{Colorspace, OutputPixelFormat, SignalRange};
use crate::sink::{ColorConverter, OutputFrame};

/// Luma coefficients `(Kr, Kb)` for a colorspace
const fn luma_coefficients(colorspace: Colorspace) -> (f32, f32) {
    match colorspace {
        Colorspace::Rec601 => (0.299, 0.114),
        Colorspace::Rec709 => (0.2126, 0.0722),
        Colorspace::Rec2020 => (0.2627, 0.0593),
    }
}

/// Per-colorspace matrix applied to one pixel
#[derive(Debug, Clone, Copy)]
struct Matrix {
    kr: f32,
    kg: f32,
    kb: f32,
    luma_gain: f32,
    luma_offset: f32,
    cb_gain: f32,
    cr_gain: f32,
}

impl Matrix {
    /// Matrix for staging pixels in `range`
    fn new(colorspace: Colorspace, range: SignalRange) -> Self {
        let (luma_gain, luma_offset, chroma_gain) = match range {
            SignalRange::Legal => (1.0, 0.0, 224.0 / 219.0),
            SignalRange::Full => (219.0 / 255.0, 16.0, 224.0 / 255.0),
        };
        let (kr, kb) = luma_coefficients(colorspace);
        Self {
            kr,
            kg: 1.0 - kr - kb,
            kb,
            luma_gain,
            luma_offset,
            cb_gain: 0.5 / (1.0 - kb) * chroma_gain,
            cr_gain: 0.5 / (1.0 - kr) * chroma_gain,
        }
    }

    /// Convert one BGRA pixel to `(Y, Cb, Cr)` on the 8-bit scale
    #[inline]
    fn apply(&self, bgra: &[u8]) -> (f32, f32, f32) {
        let b = f32::from(bgra[0]);
        let g = f32::from(bgra[1]);
        let r = f32::from(bgra[2]);

        let y = self.kr * r + self.kg * g + self.kb * b;
        let cb = 128.0 + (b - y) * self.cb_gain;
        let cr = 128.0 + (r - y) * self.cr_gain;
        (self.luma_offset + y * self.luma_gain, cb, cr)
    }
}

#[inline]
fn to_8bit(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn to_10bit(v: f32) -> u32 {
    (v * 4.0).round().clamp(0.0, 1023.0) as u32
}

fn check_staging(staging: &OutputFrame) -> Result<(), ConversionError> {
    let expected = staging.width as usize * staging.height as usize * 4;
    if staging.format != OutputPixelFormat::Bgra8 || staging.data.len() != expected {
        return Err(ConversionError::BufferSize {
            expected,
            actual: staging.data.len(),
        });
    }
    Ok(())
}

/// Convert a BGRA8 frame to 8-bit 4:2:2 (`2vuy`)
///
/// Chroma is the average of each pixel pair. An odd final pixel is paired
/// with itself. `range` is the range of the source RGB.
pub fn bgra_to_uyvy(src: &[u8], width: u32, height: u32, colorspace: Colorspace, range: SignalRange) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let row_bytes = OutputPixelFormat::Yuv8.row_bytes(width);
    let matrix = Matrix::new(colorspace, range);

    let mut dst = vec![0u8; row_bytes * h];

    for y in 0..h {
        let row = &src[y * w * 4..(y + 1) * w * 4];
        let out = &mut dst[y * row_bytes..(y + 1) * row_bytes];

        for (pair, x) in (0..w).step_by(2).enumerate() {
            let x1 = (x + 1).min(w - 1);
            let (y0, cb0, cr0) = matrix.apply(&row[x * 4..x * 4 + 4]);
            let (y1, cb1, cr1) = matrix.apply(&row[x1 * 4..x1 * 4 + 4]);

            let o = pair * 4;
            out[o] = to_8bit((cb0 + cb1) / 2.0);
            out[o + 1] = to_8bit(y0);
            out[o + 2] = to_8bit((cr0 + cr1) / 2.0);
            out[o + 3] = to_8bit(y1);
        }
    }

    dst
}

/// Convert a BGRA8 frame to 10-bit 4:2:2 (`v210`)
///
/// Each little-endian 32-bit word carries three 10-bit samples. Rows are
/// padded to whole 48-pixel groups; padding pixels repeat the last pixel
/// of the row.
pub fn bgra_to_v210(src: &[u8], width: u32, height: u32, colorspace: Colorspace, range: SignalRange) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let row_bytes = OutputPixelFormat::Yuv10.row_bytes(width);
    let matrix = Matrix::new(colorspace, range);

    let mut dst = vec![0u8; row_bytes * h];
    let mut luma = vec![0u32; w.div_ceil(6) * 6];
    let mut chroma = vec![(0u32, 0u32); w.div_ceil(6) * 3];

    for y in 0..h {
        let row = &src[y * w * 4..(y + 1) * w * 4];

        for (i, sample) in luma.iter_mut().enumerate() {
            let x = i.min(w - 1);
            *sample = to_10bit(matrix.apply(&row[x * 4..x * 4 + 4]).0);
        }
        for (pair, sample) in chroma.iter_mut().enumerate() {
            let x0 = (pair * 2).min(w - 1);
            let x1 = (pair * 2 + 1).min(w - 1);
            let (_, cb0, cr0) = matrix.apply(&row[x0 * 4..x0 * 4 + 4]);
            let (_, cb1, cr1) = matrix.apply(&row[x1 * 4..x1 * 4 + 4]);
            *sample = (to_10bit((cb0 + cb1) / 2.0), to_10bit((cr0 + cr1) / 2.0));
        }

        let out = &mut dst[y * row_bytes..(y + 1) * row_bytes];
        for group in 0..w.div_ceil(6) {
            let yy = &luma[group * 6..group * 6 + 6];
            let cc = &chroma[group * 3..group * 3 + 3];
            let words = [
                cc[0].0 | yy[0] << 10 | cc[0].1 << 20,
                yy[1] | cc[1].0 << 10 | yy[2] << 20,
                cc[1].1 | yy[3] << 10 | cc[2].0 << 20,
                yy[4] | cc[2].1 << 10 | yy[5] << 20,
            ];
            for (i, word) in words.iter().enumerate() {
                let o = group * 16 + i * 4;
                out[o..o + 4].copy_from_slice(&word.to_le_bytes());
            }
        }
    }

    dst
}

/// CPU colour conversion context
#[derive(Debug, Default)]
pub struct SoftwareYuvConverter;

impl SoftwareYuvConverter {
    /// Create a new converter
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ColorConverter for SoftwareYuvConverter {
    fn convert(
        &mut self,
        staging: &OutputFrame,
        target: OutputPixelFormat,
        colorspace: Colorspace,
        range: SignalRange,
    ) -> Result<OutputFrame, ConversionError> {
        check_staging(staging)?;

        let (width, height) = (staging.width, staging.height);
        let data = match target {
            OutputPixelFormat::Yuv8 => bgra_to_uyvy(&staging.data, width, height, colorspace, range),
            OutputPixelFormat::Yuv10 => bgra_to_v210(&staging.data, width, height, colorspace, range),
            other => return Err(ConversionError::Unsupported(other)),
        };

        Ok(OutputFrame {
            width: staging.width,
            height: staging.height,
            row_bytes: target.row_bytes(staging.width),
            format: target,
            colorspace: Some(colorspace),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging(width: u32, height: u32, bgra: [u8; 4]) -> OutputFrame {
        OutputFrame {
            width,
            height,
            row_bytes: width as usize * 4,
            format: OutputPixelFormat::Bgra8,
            colorspace: None,
            data: bgra.repeat(width as usize * height as usize),
        }
    }

    #[test]
    fn test_legal_black_and_white() {
        for colorspace in [Colorspace::Rec601, Colorspace::Rec709, Colorspace::Rec2020] {
            let black = bgra_to_uyvy(&[16, 16, 16, 255].repeat(2), 2, 1, colorspace, SignalRange::Legal);
            assert_eq!(black, vec![128, 16, 128, 16]);

            let white = bgra_to_uyvy(&[235, 235, 235, 255].repeat(2), 2, 1, colorspace, SignalRange::Legal);
            assert_eq!(white, vec![128, 235, 128, 235]);
        }
    }

    #[test]
    fn test_full_range_black_and_white() {
        for colorspace in [Colorspace::Rec601, Colorspace::Rec709, Colorspace::Rec2020] {
            let black = bgra_to_uyvy(&[0, 0, 0, 255].repeat(2), 2, 1, colorspace, SignalRange::Full);
            assert_eq!(black, vec![128, 16, 128, 16]);

            let white = bgra_to_uyvy(&[255, 255, 255, 255].repeat(2), 2, 1, colorspace, SignalRange::Full);
            assert_eq!(white, vec![128, 235, 128, 235]);
        }
    }

    #[test]
    fn test_full_range_saturated_red_does_not_clip() {
        let out = bgra_to_uyvy(&[0, 0, 255, 255].repeat(2), 2, 1, Colorspace::Rec709, SignalRange::Full);
        assert_eq!(out[1], 63, "y");
        assert_eq!(out[0], 102, "cb");
        assert_eq!(out[2], 240, "cr at the studio ceiling, not 255");

        // Saturated primaries and secondaries all stay in studio range
        for bgra in [
            [255, 0, 0, 255],
            [0, 255, 0, 255],
            [255, 255, 0, 255],
            [0, 255, 255, 255],
            [255, 0, 255, 255],
        ] {
            let out = bgra_to_uyvy(&bgra.repeat(2), 2, 1, Colorspace::Rec709, SignalRange::Full);
            assert!((16..=235).contains(&out[1]), "luma {}", out[1]);
            assert!((16..=240).contains(&out[0]), "cb {}", out[0]);
            assert!((16..=240).contains(&out[2]), "cr {}", out[2]);
        }
    }

    #[test]
    fn test_legal_primaries_stay_in_range() {
        // Legal-range pure red, green and blue
        for bgra in [[16, 16, 235, 255], [16, 235, 16, 255], [235, 16, 16, 255]] {
            let out = bgra_to_uyvy(&bgra.repeat(2), 2, 1, Colorspace::Rec709, SignalRange::Legal);
            assert!((16..=235).contains(&out[1]), "luma {}", out[1]);
            assert!((16..=240).contains(&out[0]), "cb {}", out[0]);
            assert!((16..=240).contains(&out[2]), "cr {}", out[2]);
        }
    }

    #[test]
    fn test_odd_width_duplicates_last_pixel() {
        let src = [[16, 16, 16, 255], [235, 235, 235, 255], [235, 235, 235, 255]].concat();
        let out = bgra_to_uyvy(&src, 3, 1, Colorspace::Rec709, SignalRange::Legal);
        assert_eq!(out.len(), 8);
        assert_eq!(&out[4..], &[128, 235, 128, 235]);
    }

    #[test]
    fn test_v210_black_row() {
        let out = bgra_to_v210(&[16, 16, 16, 255].repeat(6), 6, 1, Colorspace::Rec709, SignalRange::Legal);
        assert_eq!(out.len(), 128);

        let word = u32::from_le_bytes([out[0], out[1], out[2], out[3]]);
        assert_eq!(word & 0x3ff, 512, "cb");
        assert_eq!((word >> 10) & 0x3ff, 64, "y");
        assert_eq!((word >> 20) & 0x3ff, 512, "cr");
        assert!(out[16..].iter().all(|&b| b == 0), "unused groups stay zero");
    }

    #[test]
    fn test_converter_rejects_rgb_target() {
        let mut converter = SoftwareYuvConverter::new();
        let frame = staging(2, 2, [16, 16, 16, 255]);
        let err = converter
            .convert(&frame, OutputPixelFormat::Argb8, Colorspace::Rec709, SignalRange::Legal)
            .expect_err("rgb target");
        assert_eq!(err, ConversionError::Unsupported(OutputPixelFormat::Argb8));
    }

    #[test]
    fn test_converter_checks_staging_size() {
        let mut converter = SoftwareYuvConverter::new();
        let mut frame = staging(2, 2, [16, 16, 16, 255]);
        frame.data.truncate(8);
        assert!(matches!(
            converter.convert(&frame, OutputPixelFormat::Yuv8, Colorspace::Rec709, SignalRange::Legal),
            Err(ConversionError::BufferSize { expected: 16, actual: 8 })
        ));
    }

    #[test]
    fn test_converter_tags_colorspace() {
        let mut converter = SoftwareYuvConverter::new();
        let frame = staging(4, 2, [16, 16, 16, 255]);
        let out = converter
            .convert(&frame, OutputPixelFormat::Yuv8, Colorspace::Rec601, SignalRange::Legal)
            .expect("convert");
        assert_eq!(out.colorspace, Some(Colorspace::Rec601));
        assert_eq!(out.row_bytes, 8);
        assert_eq!(out.data.len(), 16);
    }
}
