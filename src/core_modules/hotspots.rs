// THEORY:
// The `hotspots` module is the coarse spatial layer on top of the per-pixel
// classification. It partitions the image into a fixed 8x8 grid with
// proportional cell boundaries, measures the severe-pixel ratio of every
// cell, and ranks the worst offenders. A cell qualifies when at least a
// quarter of its classified pixels are severe on any index; only the top
// four survive ranking, which is all the insight text ever shows.
//
// The grid position doubles as a human-readable compass location via simple
// thirds banding (north/central/south x west/central/east). The reporting
// collaborator consumes row/col/ratio verbatim; the label helper lives here
// because the banding is pure arithmetic on the same coordinates.

use serde::{Deserialize, Serialize};

use crate::core_modules::classifier::ClassifiedImage;
use crate::core_modules::render::grid_span;

/// Cells per side of the hotspot grid.
pub const HOTSPOT_GRID: usize = 8;

/// Minimum severe ratio for a cell to qualify as a hotspot.
pub const HOTSPOT_RATIO_THRESHOLD: f64 = 0.25;

/// Hotspots retained after ranking.
pub const MAX_HOTSPOTS: usize = 4;

/// One flagged grid cell: coordinates plus the severe-pixel ratio inside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub row: usize,
    pub col: usize,
    pub severe_ratio: f64,
}

impl Hotspot {
    /// Coarse compass location of the cell, by thirds banding of the grid.
    pub fn compass_label(&self) -> &'static str {
        let vertical = self.row * 3 / HOTSPOT_GRID;
        let horizontal = self.col * 3 / HOTSPOT_GRID;
        match (vertical, horizontal) {
            (0, 0) => "north-west",
            (0, 1) => "north",
            (0, _) => "north-east",
            (1, 0) => "west",
            (1, 1) => "center",
            (1, _) => "east",
            (_, 0) => "south-west",
            (_, 1) => "south",
            (_, _) => "south-east",
        }
    }
}

/// Aggregates the classifier's per-pixel severe flags over the 8x8 grid and
/// returns the qualifying cells, worst first, capped at `MAX_HOTSPOTS`.
pub fn detect_hotspots(classified: &ClassifiedImage, width: u32, height: u32) -> Vec<Hotspot> {
    let width = width as usize;
    let height = height as usize;
    let mut hotspots = Vec::new();

    for row in 0..HOTSPOT_GRID {
        let (y0, y1) = grid_span(row, HOTSPOT_GRID, height);
        for col in 0..HOTSPOT_GRID {
            let (x0, x1) = grid_span(col, HOTSPOT_GRID, width);

            let mut total = 0usize;
            let mut severe = 0usize;
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let i = y * width + x;
                    if classified.analyzed[i] {
                        total += 1;
                        if classified.severe_any[i] {
                            severe += 1;
                        }
                    }
                }
            }

            if total == 0 {
                continue;
            }
            let severe_ratio = severe as f64 / total as f64;
            if severe_ratio >= HOTSPOT_RATIO_THRESHOLD {
                hotspots.push(Hotspot { row, col, severe_ratio });
            }
        }
    }

    // Worst first; ties keep scan order so ranking stays deterministic.
    hotspots.sort_by(|a, b| {
        b.severe_ratio
            .partial_cmp(&a.severe_ratio)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hotspots.truncate(MAX_HOTSPOTS);
    hotspots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::classifier::classify_image;
    use crate::core_modules::index::IndexSurvey;
    use crate::core_modules::raster::RasterImage;
    use crate::core_modules::thresholds::AdaptiveThresholds;
    use image::{Rgba, RgbaImage};

    fn classify(buffer: RgbaImage, strictness: u8) -> (ClassifiedImage, u32, u32) {
        let image = RasterImage::new(buffer);
        let survey = IndexSurvey::scan(&image);
        let thresholds = AdaptiveThresholds::build(strictness, &survey);
        let classified = classify_image(&image, &thresholds);
        (classified, image.width(), image.height())
    }

    #[test]
    fn uniform_green_field_has_no_hotspots() {
        let (classified, w, h) =
            classify(RgbaImage::from_pixel(80, 80, Rgba([0, 255, 0, 255])), 50);
        assert!(detect_hotspots(&classified, w, h).is_empty());
    }

    #[test]
    fn concentrated_stress_is_flagged_and_ranked() {
        // Severe brown patch in the top-left quadrant of a green field.
        let mut buffer = RgbaImage::from_pixel(80, 80, Rgba([0, 255, 0, 255]));
        for y in 0..20 {
            for x in 0..20 {
                buffer.put_pixel(x, y, Rgba([110, 60, 40, 255]));
            }
        }
        let (classified, w, h) = classify(buffer, 50);
        let hotspots = detect_hotspots(&classified, w, h);

        assert!(!hotspots.is_empty());
        assert!(hotspots.len() <= MAX_HOTSPOTS);
        assert!(hotspots[0].severe_ratio >= HOTSPOT_RATIO_THRESHOLD);
        assert!(hotspots.iter().all(|h| h.row < 2 && h.col < 2));
        for pair in hotspots.windows(2) {
            assert!(pair[0].severe_ratio >= pair[1].severe_ratio);
        }
    }

    #[test]
    fn compass_labels_follow_thirds_banding() {
        let corner = Hotspot { row: 0, col: 0, severe_ratio: 1.0 };
        assert_eq!(corner.compass_label(), "north-west");
        let center = Hotspot { row: 3, col: 4, severe_ratio: 1.0 };
        assert_eq!(center.compass_label(), "center");
        let south_east = Hotspot { row: 7, col: 7, severe_ratio: 1.0 };
        assert_eq!(south_east.compass_label(), "south-east");
    }
}
