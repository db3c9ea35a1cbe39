//! Synthetic sensor data
//!
//! Generates YV12 preview frames and JPEG capture payloads shaped like what
//! a phone sensor hands back, so the pipeline can be exercised without
//! hardware.

use crate::errors::CameraError;
use crate::pool::PlanarLayout;
use crate::types::Size;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, Rgb, RgbImage};

/// Fill a YV12 buffer with a moving gradient.
///
/// Luma ramps across x and shifts with `frame_number`; chroma ramps across y
/// so frames have colour, not just brightness.
pub fn fill_yv12(frame_number: u64, layout: &PlanarLayout, data: &mut [u8]) {
    let base = (frame_number % 256) as u8;
    let width = layout.width as usize;
    let height = layout.height as usize;

    for row in 0..height.min(data.len() / layout.y_stride.max(1)) {
        let line = &mut data[row * layout.y_stride..row * layout.y_stride + width];
        for (x, px) in line.iter_mut().enumerate() {
            *px = base.wrapping_add((x % 256) as u8);
        }
    }

    let chroma_rows = height / 2;
    let chroma_cols = width.div_ceil(2);
    for (offset, shift) in [(layout.v_offset(), 0u8), (layout.u_offset(), 64u8)] {
        for row in 0..chroma_rows {
            let start = offset + row * layout.uv_stride;
            let end = (start + chroma_cols).min(data.len());
            if start >= end {
                break;
            }
            data[start..end].fill(shift.wrapping_add((row % 256) as u8));
        }
    }
}

/// A complete YV12 frame of `size`, padded strides included.
pub fn synthetic_yv12_frame(frame_number: u64, size: Size) -> Vec<u8> {
    let layout = PlanarLayout::yv12(size);
    let mut data = vec![0u8; layout.len()];
    fill_yv12(frame_number, &layout, &mut data);
    data
}

/// A flat YV12 frame: every pixel has the same Y, U and V.
pub fn solid_yv12_frame(size: Size, y: u8, u: u8, v: u8) -> Vec<u8> {
    let layout = PlanarLayout::yv12(size);
    let mut data = vec![y; layout.len()];
    data[layout.v_offset()..layout.u_offset()].fill(v);
    data[layout.u_offset()..].fill(u);
    data
}

/// RGB test card with a marked top-left corner, handy for checking orientation.
pub fn synthetic_picture(frame_number: u64, size: Size) -> RgbImage {
    let base = (frame_number % 256) as u8;
    RgbImage::from_fn(size.width, size.height, |x, y| {
        if x < size.width / 8 && y < size.height / 8 {
            Rgb([255, 0, 0])
        } else {
            Rgb([
                base.wrapping_add((x % 256) as u8),
                base.wrapping_add((y % 256) as u8),
                128,
            ])
        }
    })
}

/// What a hardware encoder would hand back for a still capture.
pub fn synthetic_jpeg(frame_number: u64, size: Size) -> Result<Vec<u8>, CameraError> {
    let picture = synthetic_picture(frame_number, size);
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90).encode(
        picture.as_raw(),
        size.width,
        size.height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}
