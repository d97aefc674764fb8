// THEORY:
// The `zones` module partitions the photographed lot into a small number of
// management areas. It works on a finer 12x12 grid than the hotspot layer
// and deliberately reads its input back out of the combined heatmap buffer:
// per-cell severity counts are re-derived from the heatmap colors, because
// that buffer is the per-pixel artifact already in hand at this stage.
//
// Key architectural principles:
// 1.  **Cell Features**: Each cell becomes a 6-dimensional vector: the four
//     severity-area fractions plus its normalized (row, col) position, so
//     clusters prefer spatial coherence as well as similar stress profiles.
// 2.  **Deterministic K-Means**: Centroids seed from the first k cells in
//     scan order, with no randomization and no restarts, at most 12
//     iterations, stopping early once no cell changes assignment. Cluster
//     quality is sensitive to traversal order; that trade was made for
//     byte-reproducible results and must not be "fixed" with random seeding.
// 3.  **Zones Always Fill the Request**: k is clamped to 2..=6 and a cluster
//     that loses every cell still yields a zero-area zone, so callers can
//     rely on the returned zone count.

use serde::{Deserialize, Serialize};

use crate::core_modules::classifier::SeverityBucket;
use crate::core_modules::raster::RasterImage;
use crate::core_modules::render::{
    self, blend_rect, bucket_from_heatmap_color, grid_span, stamp_number,
};
use image::RgbaImage;

/// Cells per side of the zoning grid.
pub const ZONE_GRID: usize = 12;

/// Caller-requested zone counts are clamped into this range.
pub const MIN_ZONES: usize = 2;
pub const MAX_ZONES: usize = 6;

/// Iteration cap for the k-means refinement loop.
const MAX_ITERATIONS: usize = 12;

/// Weighted severity composite per zone; healthy contributes nothing.
const SEVERE_WEIGHT: f64 = 1.2;
const MODERATE_WEIGHT: f64 = 0.8;
const MILD_WEIGHT: f64 = 0.3;

/// Overlay color bands on the zone severity score.
const BAND_SEVERE: f64 = 0.4;
const BAND_MODERATE: f64 = 0.25;
const BAND_MILD: f64 = 0.12;

/// One zoning-grid cell: severity-area fractions plus normalized position.
#[derive(Debug, Clone)]
struct CellFeature {
    features: [f64; 6],
    row: usize,
    col: usize,
}

/// Severity breakdown of a zone's own area, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub healthy_pct: f64,
    pub mild_pct: f64,
    pub moderate_pct: f64,
    pub severe_pct: f64,
}

/// One management zone: a cluster of similar cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: usize,
    pub label: String,
    /// Share of the total image area, in percent of cell-area units.
    pub area_pct: f64,
    /// Weighted severity composite of the zone's cells.
    pub severity_score: f64,
    pub breakdown: SeverityBreakdown,
}

/// The clustering product: the zones plus the per-cell assignment used by
/// the overlay renderer.
#[derive(Debug, Clone)]
pub struct ZoneMap {
    pub zones: Vec<Zone>,
    assignments: Vec<usize>,
    cells: Vec<CellFeature>,
}

/// Clusters the combined heatmap into management zones. `requested` is
/// clamped to 2..=6; the returned zone count always equals the clamp.
pub fn cluster_zones(
    combined_heatmap: &[u8],
    width: u32,
    height: u32,
    requested: usize,
) -> ZoneMap {
    let k = requested.clamp(MIN_ZONES, MAX_ZONES);
    let cells = extract_cell_features(combined_heatmap, width as usize, height as usize);
    let assignments = kmeans(&cells, k);
    let zones = summarize_zones(&cells, &assignments, k);
    ZoneMap { zones, assignments, cells }
}

/// Derives each cell's severity fractions straight from the heatmap colors.
fn extract_cell_features(heatmap: &[u8], width: usize, height: usize) -> Vec<CellFeature> {
    let mut cells = Vec::with_capacity(ZONE_GRID * ZONE_GRID);
    let position_scale = (ZONE_GRID - 1) as f64;

    for row in 0..ZONE_GRID {
        let (y0, y1) = grid_span(row, ZONE_GRID, height);
        for col in 0..ZONE_GRID {
            let (x0, x1) = grid_span(col, ZONE_GRID, width);

            let mut counts = [0usize; 4];
            let mut counted = 0usize;
            if width > 0 && height > 0 {
                for y in y0..=y1 {
                    for x in x0..=x1 {
                        let offset = (y * width + x) * 4;
                        let bucket = bucket_from_heatmap_color(
                            heatmap[offset],
                            heatmap[offset + 1],
                            heatmap[offset + 3],
                        );
                        if let Some(bucket) = bucket {
                            counted += 1;
                            match bucket {
                                SeverityBucket::Severe => counts[0] += 1,
                                SeverityBucket::Moderate => counts[1] += 1,
                                SeverityBucket::Mild => counts[2] += 1,
                                SeverityBucket::Healthy => counts[3] += 1,
                            }
                        }
                    }
                }
            }

            let ratio = |n: usize| if counted == 0 { 0.0 } else { n as f64 / counted as f64 };
            cells.push(CellFeature {
                features: [
                    ratio(counts[0]),
                    ratio(counts[1]),
                    ratio(counts[2]),
                    ratio(counts[3]),
                    row as f64 / position_scale,
                    col as f64 / position_scale,
                ],
                row,
                col,
            });
        }
    }

    cells
}

/// Deterministic k-means over the 6-dim cell features: first-k seeding, at
/// most `MAX_ITERATIONS` rounds, early stop on a stable assignment.
fn kmeans(cells: &[CellFeature], k: usize) -> Vec<usize> {
    let mut centroids: Vec<[f64; 6]> = cells.iter().take(k).map(|c| c.features).collect();
    while centroids.len() < k {
        centroids.push([0.0; 6]);
    }
    let mut assignments = vec![0usize; cells.len()];

    for _ in 0..MAX_ITERATIONS {
        // Assignment step.
        let mut changed = false;
        for (i, cell) in cells.iter().enumerate() {
            let mut best = 0usize;
            let mut best_distance = f64::INFINITY;
            for (cluster, centroid) in centroids.iter().enumerate() {
                let distance = distance_sq(&cell.features, centroid);
                if distance < best_distance {
                    best_distance = distance;
                    best = cluster;
                }
            }
            if assignments[i] != best {
                assignments[i] = best;
                changed = true;
            }
        }

        // Update step: empty clusters keep their previous centroid.
        let mut sums = vec![[0.0f64; 6]; k];
        let mut counts = vec![0usize; k];
        for (i, cell) in cells.iter().enumerate() {
            let cluster = assignments[i];
            counts[cluster] += 1;
            for d in 0..6 {
                sums[cluster][d] += cell.features[d];
            }
        }
        for cluster in 0..k {
            if counts[cluster] > 0 {
                for d in 0..6 {
                    centroids[cluster][d] = sums[cluster][d] / counts[cluster] as f64;
                }
            }
        }

        if !changed {
            break;
        }
    }

    assignments
}

fn distance_sq(a: &[f64; 6], b: &[f64; 6]) -> f64 {
    let mut sum = 0.0;
    for d in 0..6 {
        let diff = a[d] - b[d];
        sum += diff * diff;
    }
    sum
}

fn summarize_zones(cells: &[CellFeature], assignments: &[usize], k: usize) -> Vec<Zone> {
    let total_cells = cells.len().max(1);
    let mut zones = Vec::with_capacity(k);

    for cluster in 0..k {
        let mut cell_count = 0usize;
        let mut weighted = [0.0f64; 4]; // severe, moderate, mild, healthy
        for (i, cell) in cells.iter().enumerate() {
            if assignments[i] == cluster {
                cell_count += 1;
                for d in 0..4 {
                    weighted[d] += cell.features[d];
                }
            }
        }

        let fraction = |d: usize| if cell_count == 0 { 0.0 } else { weighted[d] / cell_count as f64 };
        let severe = fraction(0);
        let moderate = fraction(1);
        let mild = fraction(2);
        let healthy = fraction(3);
        let severity_score =
            severe * SEVERE_WEIGHT + moderate * MODERATE_WEIGHT + mild * MILD_WEIGHT;

        zones.push(Zone {
            id: cluster + 1,
            label: severity_label(severity_score).to_string(),
            area_pct: cell_count as f64 / total_cells as f64 * 100.0,
            severity_score,
            breakdown: SeverityBreakdown {
                healthy_pct: healthy * 100.0,
                mild_pct: mild * 100.0,
                moderate_pct: moderate * 100.0,
                severe_pct: severe * 100.0,
            },
        });
    }

    zones
}

fn severity_label(score: f64) -> &'static str {
    if score >= BAND_SEVERE {
        "critical"
    } else if score >= BAND_MODERATE {
        "stressed"
    } else if score >= BAND_MILD {
        "watch"
    } else {
        "stable"
    }
}

fn band_color(score: f64) -> [u8; 4] {
    if score >= BAND_SEVERE {
        render::SEVERE_RGBA
    } else if score >= BAND_MODERATE {
        render::MODERATE_RGBA
    } else if score >= BAND_MILD {
        render::MILD_RGBA
    } else {
        render::HEALTHY_RGBA
    }
}

/// Renders the zone map over the original: every cell is filled with its
/// zone's severity-band color, and each non-empty zone's id is stamped at
/// the centroid of its cells.
pub fn render_zone_overlay(original: &RasterImage, map: &ZoneMap) -> RgbaImage {
    let mut canvas = original.as_rgba().clone();
    let width = original.width() as usize;
    let height = original.height() as usize;

    for (i, cell) in map.cells.iter().enumerate() {
        let zone = &map.zones[map.assignments[i]];
        let (y0, y1) = grid_span(cell.row, ZONE_GRID, height);
        let (x0, x1) = grid_span(cell.col, ZONE_GRID, width);
        blend_rect(&mut canvas, x0, y0, x1, y1, band_color(zone.severity_score));
    }

    for zone in &map.zones {
        let mut sum_x = 0usize;
        let mut sum_y = 0usize;
        let mut members = 0usize;
        for (i, cell) in map.cells.iter().enumerate() {
            if map.assignments[i] == zone.id - 1 {
                let (y0, y1) = grid_span(cell.row, ZONE_GRID, height);
                let (x0, x1) = grid_span(cell.col, ZONE_GRID, width);
                sum_x += (x0 + x1) / 2;
                sum_y += (y0 + y1) / 2;
                members += 1;
            }
        }
        if members > 0 {
            stamp_number(
                &mut canvas,
                sum_x / members,
                sum_y / members,
                zone.id,
                [255, 255, 255, 255],
            );
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::classifier::classify_image;
    use crate::core_modules::index::IndexSurvey;
    use crate::core_modules::thresholds::AdaptiveThresholds;
    use image::{Rgba, RgbaImage};

    fn combined_heatmap(buffer: RgbaImage, strictness: u8) -> (Vec<u8>, u32, u32) {
        let image = RasterImage::new(buffer);
        let survey = IndexSurvey::scan(&image);
        let thresholds = AdaptiveThresholds::build(strictness, &survey);
        let classified = classify_image(&image, &thresholds);
        (classified.heatmaps.combined, image.width(), image.height())
    }

    fn split_field() -> (Vec<u8>, u32, u32) {
        // Left half healthy green, right half stressed brown.
        let mut buffer = RgbaImage::from_pixel(96, 96, Rgba([0, 255, 0, 255]));
        for y in 0..96 {
            for x in 48..96 {
                buffer.put_pixel(x, y, Rgba([110, 60, 40, 255]));
            }
        }
        combined_heatmap(buffer, 50)
    }

    #[test]
    fn requested_count_is_clamped_and_always_honored() {
        let (heatmap, w, h) = split_field();
        assert_eq!(cluster_zones(&heatmap, w, h, 1).zones.len(), MIN_ZONES);
        assert_eq!(cluster_zones(&heatmap, w, h, 10).zones.len(), MAX_ZONES);
        assert_eq!(cluster_zones(&heatmap, w, h, 4).zones.len(), 4);
    }

    #[test]
    fn zone_areas_sum_to_full_image() {
        let (heatmap, w, h) = split_field();
        for requested in [2, 4, 6] {
            let map = cluster_zones(&heatmap, w, h, requested);
            let total: f64 = map.zones.iter().map(|z| z.area_pct).sum();
            assert!((total - 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn split_field_separates_into_healthy_and_severe_zones() {
        let (heatmap, w, h) = split_field();
        let map = cluster_zones(&heatmap, w, h, 2);

        let healthy_zone = map
            .zones
            .iter()
            .find(|z| z.breakdown.healthy_pct > 90.0)
            .expect("a predominantly healthy zone");
        let severe_zone = map
            .zones
            .iter()
            .find(|z| z.breakdown.severe_pct > 90.0)
            .expect("a predominantly severe zone");

        assert!((healthy_zone.area_pct - 50.0).abs() < 5.0);
        assert!((severe_zone.area_pct - 50.0).abs() < 5.0);
        assert!(severe_zone.severity_score > healthy_zone.severity_score);
        assert_eq!(severity_label(severe_zone.severity_score), "critical");
        assert_eq!(severity_label(healthy_zone.severity_score), "stable");
    }

    #[test]
    fn clustering_is_deterministic() {
        let (heatmap, w, h) = split_field();
        let first = cluster_zones(&heatmap, w, h, 4);
        let second = cluster_zones(&heatmap, w, h, 4);
        assert_eq!(first.zones, second.zones);
        assert_eq!(first.assignments, second.assignments);
    }

    #[test]
    fn uniform_field_yields_only_healthy_zones() {
        let (heatmap, w, h) =
            combined_heatmap(RgbaImage::from_pixel(48, 48, Rgba([0, 255, 0, 255])), 50);
        let map = cluster_zones(&heatmap, w, h, 3);

        // Identical bucket fractions everywhere: position still splits cells,
        // but every zone must be fully healthy and areas must still total 100.
        let total: f64 = map.zones.iter().map(|z| z.area_pct).sum();
        assert!((total - 100.0).abs() < 1e-6);
        for zone in map.zones.iter().filter(|z| z.area_pct > 0.0) {
            assert!(zone.breakdown.healthy_pct > 99.0);
            assert_eq!(zone.severity_score, 0.0);
        }
    }

    #[test]
    fn overlay_renders_at_source_resolution() {
        let (heatmap, w, h) = split_field();
        let map = cluster_zones(&heatmap, w, h, 2);
        let original = RasterImage::new(RgbaImage::from_pixel(w, h, Rgba([0, 255, 0, 255])));
        let overlay = render_zone_overlay(&original, &map);
        assert_eq!(overlay.width(), w);
        assert_eq!(overlay.height(), h);
    }
}
