// Raster composition helpers shared by the classifier, hotspot and zone
// stages: the severity palette, heatmap-over-original blending, proportional
// grid spans, and the tiny digit stamp used to label zones on the overlay.

use image::{Rgba, RgbaImage};

use crate::core_modules::classifier::SeverityBucket;
use crate::core_modules::raster::RasterImage;

/// Opacity at which heatmaps and zone fills are blended over the original.
pub const OVERLAY_OPACITY: f64 = 0.45;

/// Severity palette. The zone stage re-derives per-cell bucket counts from
/// these exact channel values, so they double as a color protocol between the
/// classifier and the clustering engine.
pub const HEALTHY_RGBA: [u8; 4] = [56, 142, 60, 255];
pub const MILD_RGBA: [u8; 4] = [251, 192, 45, 255];
pub const MODERATE_RGBA: [u8; 4] = [245, 124, 0, 255];
pub const SEVERE_RGBA: [u8; 4] = [211, 47, 47, 255];
/// Skipped pixels stay fully transparent so they drop out of both the
/// overlays and the zone stage's color re-derivation.
pub const SKIPPED_RGBA: [u8; 4] = [0, 0, 0, 0];

pub fn bucket_color(bucket: SeverityBucket) -> [u8; 4] {
    match bucket {
        SeverityBucket::Healthy => HEALTHY_RGBA,
        SeverityBucket::Mild => MILD_RGBA,
        SeverityBucket::Moderate => MODERATE_RGBA,
        SeverityBucket::Severe => SEVERE_RGBA,
    }
}

/// Maps a heatmap pixel back to its severity bucket using fixed channel
/// thresholds. Transparent (skipped) pixels map to `None`.
pub fn bucket_from_heatmap_color(red: u8, green: u8, alpha: u8) -> Option<SeverityBucket> {
    if alpha == 0 {
        return None;
    }
    if red >= 200 {
        if green < 80 {
            Some(SeverityBucket::Severe)
        } else if green < 160 {
            Some(SeverityBucket::Moderate)
        } else {
            Some(SeverityBucket::Mild)
        }
    } else if green >= 100 {
        Some(SeverityBucket::Healthy)
    } else {
        None
    }
}

/// Alpha-blends a heatmap buffer over the original at `OVERLAY_OPACITY`.
/// Transparent heatmap pixels leave the original untouched.
pub fn blend_overlay(original: &RasterImage, heatmap: &[u8]) -> RgbaImage {
    RgbaImage::from_fn(original.width(), original.height(), |x, y| {
        let offset = ((y * original.width() + x) * 4) as usize;
        let base = &original.data()[offset..offset + 4];
        let heat = &heatmap[offset..offset + 4];
        if heat[3] == 0 {
            return Rgba([base[0], base[1], base[2], 255]);
        }
        let mix = |b: u8, h: u8| -> u8 {
            (b as f64 * (1.0 - OVERLAY_OPACITY) + h as f64 * OVERLAY_OPACITY).round() as u8
        };
        Rgba([mix(base[0], heat[0]), mix(base[1], heat[1]), mix(base[2], heat[2]), 255])
    })
}

/// Pixel span `[start, end]` of one grid cell along one axis, with
/// proportional (not pixel-aligned) boundaries.
pub fn grid_span(cell: usize, grid: usize, extent: usize) -> (usize, usize) {
    if grid == 0 || extent == 0 {
        return (0, 0);
    }
    let start = (cell * extent) / grid;
    let end = (((cell + 1) * extent) / grid).saturating_sub(1);
    (start.min(extent - 1), end.min(extent - 1))
}

/// Fills an inclusive rectangle, blending the fill color over the existing
/// canvas at `OVERLAY_OPACITY`.
pub fn blend_rect(
    canvas: &mut RgbaImage,
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
    color: [u8; 4],
) {
    let (width, height) = (canvas.width() as usize, canvas.height() as usize);
    if width == 0 || height == 0 {
        return;
    }
    for y in y0.min(height - 1)..=y1.min(height - 1) {
        for x in x0.min(width - 1)..=x1.min(width - 1) {
            let base = canvas.get_pixel(x as u32, y as u32).0;
            let mix = |b: u8, c: u8| -> u8 {
                (b as f64 * (1.0 - OVERLAY_OPACITY) + c as f64 * OVERLAY_OPACITY).round() as u8
            };
            canvas.put_pixel(
                x as u32,
                y as u32,
                Rgba([mix(base[0], color[0]), mix(base[1], color[1]), mix(base[2], color[2]), 255]),
            );
        }
    }
}

// 3x5 digit glyphs, one row per byte, low three bits used.
const DIGIT_GLYPHS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b010, 0b010, 0b010], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
];

const GLYPH_SCALE: usize = 4;

/// Stamps a small decimal number centered at (cx, cy). Used to mark zone ids
/// on the zone overlay.
pub fn stamp_number(canvas: &mut RgbaImage, cx: usize, cy: usize, number: usize, color: [u8; 4]) {
    let digits: Vec<usize> = number
        .to_string()
        .bytes()
        .map(|b| (b - b'0') as usize)
        .collect();

    let glyph_width = 3 * GLYPH_SCALE;
    let glyph_height = 5 * GLYPH_SCALE;
    let total_width = digits.len() * glyph_width + (digits.len().saturating_sub(1)) * GLYPH_SCALE;
    let origin_x = cx.saturating_sub(total_width / 2);
    let origin_y = cy.saturating_sub(glyph_height / 2);

    let (width, height) = (canvas.width() as usize, canvas.height() as usize);
    for (slot, digit) in digits.iter().enumerate() {
        let glyph = &DIGIT_GLYPHS[*digit];
        let base_x = origin_x + slot * (glyph_width + GLYPH_SCALE);
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..3 {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        let x = base_x + col * GLYPH_SCALE + dx;
                        let y = origin_y + row * GLYPH_SCALE + dy;
                        if x < width && y < height {
                            canvas.put_pixel(x as u32, y as u32, Rgba(color));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_roundtrips_through_heatmap_rederivation() {
        for bucket in [
            SeverityBucket::Healthy,
            SeverityBucket::Mild,
            SeverityBucket::Moderate,
            SeverityBucket::Severe,
        ] {
            let [r, g, _, a] = bucket_color(bucket);
            assert_eq!(bucket_from_heatmap_color(r, g, a), Some(bucket));
        }
        let [r, g, _, a] = SKIPPED_RGBA;
        assert_eq!(bucket_from_heatmap_color(r, g, a), None);
    }

    #[test]
    fn grid_spans_cover_the_extent_without_overlap() {
        let extent = 100;
        let grid = 8;
        let mut covered = 0;
        let mut previous_end: Option<usize> = None;
        for cell in 0..grid {
            let (start, end) = grid_span(cell, grid, extent);
            if let Some(prev) = previous_end {
                assert_eq!(start, prev + 1);
            }
            covered += end - start + 1;
            previous_end = Some(end);
        }
        assert_eq!(covered, extent);
        assert_eq!(previous_end, Some(extent - 1));
    }

    #[test]
    fn overlay_blend_keeps_skipped_pixels_untouched() {
        let original = RasterImage::new(RgbaImage::from_pixel(2, 1, Rgba([100, 100, 100, 255])));
        let mut heatmap = vec![0u8; 8];
        heatmap[..4].copy_from_slice(&SEVERE_RGBA);
        let blended = blend_overlay(&original, &heatmap);

        // First pixel blended toward severe red, second identical to source.
        assert!(blended.get_pixel(0, 0).0[0] > 100);
        assert_eq!(blended.get_pixel(1, 0).0, [100, 100, 100, 255]);
    }
}
