// THEORY:
// The `raster` module is the boundary between encoded image bytes and the
// engine's working representation. Everything downstream of this module
// operates on one flat RGBA buffer; nothing downstream ever touches an
// encoded format again until results are packaged.
//
// Key architectural principles:
// 1.  **Codec Seam**: Decoding and encoding are expressed as the
//     `RasterDecoder` / `RasterEncoder` trait pair so the algorithm never
//     depends on a concrete image library. `PngCodec` is the default
//     implementation, backed by the `image` crate.
// 2.  **Bounded Resolution**: `RasterImage::downscaled` caps the longest side
//     of the working buffer. This is the engine's resource guard: an
//     arbitrarily large upload can never produce an unbounded pixel pass.
// 3.  **Immutable Input**: Once normalized, the `RasterImage` is read-only
//     for the rest of the invocation. Composited outputs (heatmaps, overlays)
//     are always fresh buffers.

use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::error::{AnalysisError, Result};

/// Longest-side cap applied while normalizing the decoded image.
pub const DEFAULT_MAX_DIMENSION: u32 = 900;

/// Turns encoded image bytes into a pixel buffer.
pub trait RasterDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage>;
}

/// Turns a pixel buffer back into encoded image bytes.
pub trait RasterEncoder {
    fn encode(&self, image: &RasterImage) -> Result<Vec<u8>>;
}

/// A decoded RGBA raster. The working representation for one analysis run.
#[derive(Debug, Clone)]
pub struct RasterImage {
    buffer: RgbaImage,
}

impl RasterImage {
    pub fn new(buffer: RgbaImage) -> Self {
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn pixel_count(&self) -> usize {
        (self.buffer.width() * self.buffer.height()) as usize
    }

    /// The flat RGBA byte buffer, row-major, 4 bytes per pixel.
    pub fn data(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.buffer
    }

    /// Uniformly scales the raster down so its longest side does not exceed
    /// `max_dimension`. Dimensions are rounded to the nearest integer with a
    /// floor of 1px. A raster already within the bound is returned unchanged.
    pub fn downscaled(self, max_dimension: u32) -> RasterImage {
        let longest = self.width().max(self.height());
        if max_dimension == 0 || longest <= max_dimension {
            return self;
        }

        let scale = max_dimension as f64 / longest as f64;
        let new_width = ((self.width() as f64 * scale).round() as u32).max(1);
        let new_height = ((self.height() as f64 * scale).round() as u32).max(1);
        let resized =
            image::imageops::resize(&self.buffer, new_width, new_height, FilterType::Triangle);
        RasterImage::new(resized)
    }
}

/// Default codec: decodes any format the `image` crate recognizes and
/// encodes results as PNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngCodec;

impl PngCodec {
    /// Encodes a raw RGBA buffer as PNG bytes.
    pub fn encode_rgba(buffer: &RgbaImage) -> Result<Vec<u8>> {
        Self::encode_rgba_bytes(buffer.as_raw(), buffer.width(), buffer.height())
    }

    /// Encodes a flat RGBA byte slice (such as a heatmap buffer) as PNG.
    pub fn encode_rgba_bytes(bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let encoder = PngEncoder::new(&mut out);
        encoder
            .write_image(bytes, width, height, ExtendedColorType::Rgba8)
            .map_err(AnalysisError::Encode)?;
        Ok(out)
    }
}

impl RasterDecoder for PngCodec {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(RasterImage::new(decoded.to_rgba8()))
    }
}

impl RasterEncoder for PngCodec {
    fn encode(&self, image: &RasterImage) -> Result<Vec<u8>> {
        Self::encode_rgba(&image.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid_raster(width: u32, height: u32, rgba: [u8; 4]) -> RasterImage {
        RasterImage::new(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    #[test]
    fn decode_rejects_garbage_bytes() {
        let result = PngCodec.decode(b"definitely not an image");
        assert!(matches!(result, Err(AnalysisError::Decode(_))));
    }

    #[test]
    fn png_roundtrip_preserves_dimensions() {
        let raster = solid_raster(12, 7, [10, 200, 30, 255]);
        let bytes = PngCodec.encode(&raster).expect("encode");
        let back = PngCodec.decode(&bytes).expect("decode");
        assert_eq!(back.width(), 12);
        assert_eq!(back.height(), 7);
        assert_eq!(back.data()[..4], [10, 200, 30, 255]);
    }

    #[test]
    fn downscale_caps_longest_side() {
        let raster = solid_raster(1800, 900, [0, 255, 0, 255]);
        let small = raster.downscaled(900);
        assert_eq!(small.width(), 900);
        assert_eq!(small.height(), 450);
    }

    #[test]
    fn downscale_leaves_small_images_alone() {
        let raster = solid_raster(640, 480, [0, 255, 0, 255]);
        let same = raster.downscaled(900);
        assert_eq!(same.width(), 640);
        assert_eq!(same.height(), 480);
    }

    #[test]
    fn downscale_never_collapses_to_zero() {
        let raster = solid_raster(2000, 1, [0, 255, 0, 255]);
        let small = raster.downscaled(900);
        assert_eq!(small.width(), 900);
        assert_eq!(small.height(), 1);
    }
}
