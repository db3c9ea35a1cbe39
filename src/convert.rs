//! Pixel conversion and the compressed intermediate used by both frame paths.
//!
//! Preview: YV12 → RGB staging → JPEG intermediate → RGB scratch image.
//! Capture: hardware JPEG → RGB, decoded at a smaller DCT scale on memory
//! pressure, oriented.

use crate::errors::CameraError;
use crate::geometry::Transform;
use crate::pool::PlanarLayout;
use crate::types::Size;
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::imageops::{self, FilterType};
use image::{
    ColorType, DynamicImage, ExtendedColorType, GrayImage, ImageDecoder, ImageFormat, Limits,
    RgbImage,
};
use std::io::Cursor;

/// Convert one YV12 frame to packed RGB8 (BT.601, studio swing).
///
/// `out` must hold `width * height * 3` bytes.
pub fn yv12_to_rgb(data: &[u8], layout: &PlanarLayout, out: &mut [u8]) -> Result<(), CameraError> {
    let width = layout.width as usize;
    let height = layout.height as usize;
    if data.len() < layout.len() {
        return Err(CameraError::DecodeFailure(format!(
            "raw frame is {} bytes, layout needs {}",
            data.len(),
            layout.len()
        )));
    }
    if out.len() < width * height * 3 {
        return Err(CameraError::DecodeFailure(format!(
            "rgb buffer is {} bytes, need {}",
            out.len(),
            width * height * 3
        )));
    }

    let y_plane = &data[..layout.y_size];
    let v_plane = &data[layout.v_offset()..layout.u_offset()];
    let u_plane = &data[layout.u_offset()..layout.len()];

    for row in 0..height {
        let y_row = row * layout.y_stride;
        let uv_row = (row / 2) * layout.uv_stride;
        let out_row = row * width * 3;
        for col in 0..width {
            let u = u_plane[uv_row + col / 2] as i32 - 128;
            let v = v_plane[uv_row + col / 2] as i32 - 128;
            let y = ((y_plane[y_row + col] as i32 - 16) * 149) >> 7;

            let o = out_row + col * 3;
            out[o] = (y + ((179 * v) >> 7)).clamp(0, 255) as u8;
            out[o + 1] = (y - ((44 * u) >> 7) - ((91 * v) >> 7)).clamp(0, 255) as u8;
            out[o + 2] = (y + ((227 * u) >> 7)).clamp(0, 255) as u8;
        }
    }
    Ok(())
}

/// How a preview frame ended up decoded.
#[derive(Debug)]
pub enum Decoded {
    /// Written into the caller's scratch image.
    InPlace,
    /// The scratch image did not fit; this frame got its own allocation.
    Fresh(RgbImage),
}

/// Stage-1 working state for preview frames. Buffers only ever grow.
#[derive(Debug)]
pub struct PreviewDecoder {
    quality: u8,
    rgb_staging: Vec<u8>,
    jpeg: Vec<u8>,
}

impl PreviewDecoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            rgb_staging: Vec::new(),
            jpeg: Vec::new(),
        }
    }

    /// Worst-case intermediate size: 8.25 bytes per pixel plus 1 KiB of slop.
    pub fn worst_case_jpeg_len(size: Size) -> usize {
        (size.area() as usize * 33) / 4 + 1024
    }

    pub fn jpeg_capacity(&self) -> usize {
        self.jpeg.capacity()
    }

    /// The compressed intermediate of the last frame.
    pub fn last_jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    /// Compress a raw frame into the intermediate buffer.
    pub fn compress(&mut self, raw: &[u8], layout: &PlanarLayout) -> Result<(), CameraError> {
        let size = layout.size();
        let rgb_len = size.area() as usize * 3;
        if self.rgb_staging.len() < rgb_len {
            self.rgb_staging.resize(rgb_len, 0);
        }
        yv12_to_rgb(raw, layout, &mut self.rgb_staging[..rgb_len])?;

        let needed = Self::worst_case_jpeg_len(size);
        if self.jpeg.capacity() < needed {
            log::debug!("resizing preview jpeg buffer to {} bytes", needed);
            // Let go of the old buffer before asking for the bigger one.
            self.jpeg = Vec::new();
            self.jpeg = Vec::with_capacity(needed);
        }
        self.jpeg.clear();

        let mut encoder = JpegEncoder::new_with_quality(&mut self.jpeg, self.quality);
        encoder
            .encode(
                &self.rgb_staging[..rgb_len],
                size.width,
                size.height,
                ExtendedColorType::Rgb8,
            )
            .map_err(CameraError::from)
    }

    /// Compress, then decode the intermediate into `scratch`.
    ///
    /// When the decoded image does not fit `scratch`, the frame is decoded
    /// once into a fresh allocation instead.
    pub fn decode(
        &mut self,
        raw: &[u8],
        layout: &PlanarLayout,
        scratch: &mut RgbImage,
    ) -> Result<Decoded, CameraError> {
        self.compress(raw, layout)?;

        let decoder = JpegDecoder::new(Cursor::new(self.jpeg.as_slice()))?;
        let (w, h) = decoder.dimensions();
        let fits = decoder.color_type() == ColorType::Rgb8
            && (w, h) == scratch.dimensions()
            && decoder.total_bytes() == scratch.len() as u64;
        if fits {
            decoder.read_image(scratch)?;
            return Ok(Decoded::InPlace);
        }

        log::debug!(
            "preview decode: {}x{} does not fit scratch {:?}, allocating",
            w,
            h,
            scratch.dimensions()
        );
        let image = image::load_from_memory_with_format(&self.jpeg, ImageFormat::Jpeg)?;
        Ok(Decoded::Fresh(image.into_rgb8()))
    }
}

/// Limits applied to capture decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureBudget {
    /// Bytes one decode attempt may hold at its peak.
    pub memory_bytes: u64,
    /// Halvings attempted after the first full-resolution try.
    pub max_retries: u32,
}

/// Smallest DCT scale a baseline decoder can produce directly.
const MAX_DCT_SAMPLE: u32 = 8;

/// Decode a hardware-compressed capture and orient it.
///
/// Each attempt decodes at `1/sample` of the full resolution, starting at
/// full size. The picture is scaled during decoding, so the full-resolution
/// pixels are never materialized once an attempt has been sized down. An
/// attempt that would exceed `budget.memory_bytes` fails with `OutOfMemory`
/// before allocating and the next one halves the resolution, up to
/// `budget.max_retries` times. Any other failure ends the capture.
pub fn decode_capture(
    bytes: &[u8],
    transform: &Transform,
    budget: CaptureBudget,
) -> Result<RgbImage, CameraError> {
    let mut sample = 1u32;
    let mut last_err = None;
    for attempt in 0..=budget.max_retries {
        match decode_sampled(bytes, sample, transform, budget.memory_bytes) {
            Ok(image) => {
                log::debug!(
                    "capture decoded at 1/{} -> {}x{}",
                    sample,
                    image.width(),
                    image.height()
                );
                return Ok(image);
            }
            Err(CameraError::OutOfMemory(msg)) => {
                log::warn!("capture attempt {} at 1/{}: {}", attempt + 1, sample, msg);
                last_err = Some(CameraError::OutOfMemory(msg));
                sample = sample.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| CameraError::OutOfMemory("no capture attempt made".to_string())))
}

fn jpeg_error(err: jpeg_decoder::Error) -> CameraError {
    CameraError::DecodeFailure(err.to_string())
}

fn scaled(len: u16, sample: u32) -> u16 {
    (u32::from(len).div_ceil(sample)).max(1) as u16
}

/// One decode attempt at `1/sample`, accounted against `memory_bytes`.
fn decode_sampled(
    bytes: &[u8],
    sample: u32,
    transform: &Transform,
    memory_bytes: u64,
) -> Result<RgbImage, CameraError> {
    let mut decoder = jpeg_decoder::Decoder::new(bytes);
    decoder.read_info().map_err(jpeg_error)?;
    let info = decoder
        .info()
        .ok_or_else(|| CameraError::DecodeFailure("missing jpeg header".to_string()))?;

    let dct_sample = sample.min(MAX_DCT_SAMPLE);
    let (w, h) = decoder
        .scale(scaled(info.width, dct_sample), scaled(info.height, dct_sample))
        .map_err(jpeg_error)?;
    let (w, h) = (u32::from(w), u32::from(h));
    let (out_w, out_h) = (
        u32::from(scaled(info.width, sample)).min(w),
        u32::from(scaled(info.height, sample)).min(h),
    );
    let resampled = (out_w, out_h) != (w, h);

    let decoded_bytes = u64::from(w) * u64::from(h) * 3;
    let output_bytes = u64::from(out_w) * u64::from(out_h) * 3;

    let mut limits = Limits::default();
    limits.max_alloc = Some(memory_bytes);
    // Component planes plus the interleaved pixels.
    limits.reserve(decoded_bytes * 2)?;
    // Planes are gone once decoding returns; the oriented copy (and the
    // resampled one, past the DCT scales) live next to the decoded image.
    limits.free(decoded_bytes);
    limits.reserve(output_bytes * if resampled { 2 } else { 1 })?;

    decoder.set_max_decoding_buffer_size(usize::try_from(memory_bytes).unwrap_or(usize::MAX));
    let pixels = decoder.decode().map_err(jpeg_error)?;
    let decoded = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => RgbImage::from_raw(w, h, pixels),
        jpeg_decoder::PixelFormat::L8 => {
            GrayImage::from_raw(w, h, pixels).map(|gray| DynamicImage::ImageLuma8(gray).into_rgb8())
        }
        other => {
            return Err(CameraError::DecodeFailure(format!(
                "unsupported capture pixel format {:?}",
                other
            )))
        }
    }
    .ok_or_else(|| CameraError::DecodeFailure(format!("short capture decode at {}x{}", w, h)))?;

    if resampled {
        let sampled = imageops::resize(&decoded, out_w, out_h, FilterType::Nearest);
        drop(decoded);
        return Ok(transform.apply_to_new(&sampled));
    }
    Ok(transform.apply_to_new(&decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::resolve;
    use crate::types::{Facing, Rotation};

    fn gray_frame(layout: &PlanarLayout, luma: u8) -> Vec<u8> {
        let mut data = vec![128u8; layout.len()];
        data[..layout.y_size].fill(luma);
        data
    }

    fn jpeg_of(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 90]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode(img.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn test_neutral_chroma_gives_gray() {
        let layout = PlanarLayout::yv12(Size::new(16, 8));
        let data = gray_frame(&layout, 128);
        let mut rgb = vec![0u8; 16 * 8 * 3];
        yv12_to_rgb(&data, &layout, &mut rgb).unwrap();
        let expected = (((128 - 16) * 149) >> 7) as u8;
        assert!(rgb.iter().all(|&c| c == expected));
    }

    #[test]
    fn test_short_frame_is_decode_failure() {
        let layout = PlanarLayout::yv12(Size::new(16, 8));
        let mut rgb = vec![0u8; 16 * 8 * 3];
        let err = yv12_to_rgb(&[0u8; 10], &layout, &mut rgb).unwrap_err();
        assert!(matches!(err, CameraError::DecodeFailure(_)));
    }

    #[test]
    fn test_preview_decodes_in_place() {
        let layout = PlanarLayout::yv12(Size::new(32, 16));
        let data = gray_frame(&layout, 200);
        let mut scratch = RgbImage::new(32, 16);
        let mut decoder = PreviewDecoder::new(90);
        let decoded = decoder.decode(&data, &layout, &mut scratch).unwrap();
        assert!(matches!(decoded, Decoded::InPlace));
        let px = scratch.get_pixel(5, 5);
        assert!(px[0] > 200, "expected bright gray, got {:?}", px);
    }

    #[test]
    fn test_preview_falls_back_when_scratch_mismatched() {
        let layout = PlanarLayout::yv12(Size::new(32, 16));
        let data = gray_frame(&layout, 100);
        let mut scratch = RgbImage::new(8, 8);
        let mut decoder = PreviewDecoder::new(90);
        match decoder.decode(&data, &layout, &mut scratch).unwrap() {
            Decoded::Fresh(img) => assert_eq!(img.dimensions(), (32, 16)),
            Decoded::InPlace => panic!("scratch of the wrong size was reused"),
        }
    }

    #[test]
    fn test_jpeg_buffer_grows_but_never_shrinks() {
        let big = PlanarLayout::yv12(Size::new(64, 32));
        let small = PlanarLayout::yv12(Size::new(16, 16));
        let mut decoder = PreviewDecoder::new(90);
        decoder.compress(&gray_frame(&big, 50), &big).unwrap();
        let grown = decoder.jpeg_capacity();
        assert!(grown >= PreviewDecoder::worst_case_jpeg_len(big.size()));
        decoder.compress(&gray_frame(&small, 50), &small).unwrap();
        assert_eq!(decoder.jpeg_capacity(), grown);
        assert!(decoder.last_jpeg().starts_with(&[0xFF, 0xD8]));
    }

    #[test]
    fn test_capture_full_resolution_when_budget_allows() {
        let jpeg = jpeg_of(64, 32);
        let t = resolve(Facing::Back, Rotation::Deg90, Rotation::Deg0, Size::new(320, 240));
        let budget = CaptureBudget {
            memory_bytes: 1 << 20,
            max_retries: 5,
        };
        let img = decode_capture(&jpeg, &t, budget).unwrap();
        assert_eq!(img.dimensions(), (32, 64));
    }

    #[test]
    fn test_capture_halves_until_it_fits() {
        let jpeg = jpeg_of(64, 32);
        let t = resolve(Facing::Back, Rotation::Deg0, Rotation::Deg0, Size::new(320, 240));
        // Full size needs 2 * 6144 bytes; 1/2 needs 2 * 1536; 1/4 needs 2 * 384.
        let budget = CaptureBudget {
            memory_bytes: 1000,
            max_retries: 5,
        };
        let img = decode_capture(&jpeg, &t, budget).unwrap();
        assert_eq!(img.dimensions(), (16, 8));
    }

    #[test]
    fn test_capture_gives_up_after_retries() {
        let jpeg = jpeg_of(64, 32);
        let t = resolve(Facing::Back, Rotation::Deg0, Rotation::Deg0, Size::new(320, 240));
        let budget = CaptureBudget {
            memory_bytes: 1,
            max_retries: 2,
        };
        let err = decode_capture(&jpeg, &t, budget).unwrap_err();
        assert!(matches!(err, CameraError::OutOfMemory(_)));
    }

    #[test]
    fn test_capture_garbage_is_decode_failure() {
        let t = resolve(Facing::Back, Rotation::Deg0, Rotation::Deg0, Size::new(320, 240));
        let budget = CaptureBudget {
            memory_bytes: 1 << 20,
            max_retries: 5,
        };
        let err = decode_capture(b"not a jpeg", &t, budget).unwrap_err();
        assert!(matches!(err, CameraError::DecodeFailure(_)));
    }
}
