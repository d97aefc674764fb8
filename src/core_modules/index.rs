// THEORY:
// The `index` module is the first analytical pass of the engine. For every
// pixel it derives three RGB-only vegetation indices (GLI, VARI, TGI) and
// folds them into per-index running statistics: sum, min, max, and the full
// sample list from which percentile bands are later drawn.
//
// Key architectural principles:
// 1.  **Single-Pixel Scope**: `PixelIndices` is computed from one pixel's
//     R,G,B alone. Anything that needs the whole distribution (percentiles,
//     thresholds) lives in `IndexSurvey` and downstream modules.
// 2.  **Defined Exclusion**: A pixel whose GLI denominator (2G + R + B) is
//     zero is skipped from every statistic and from the analyzed-pixel total.
//     Pure-black artifacts (vignette corners, dead sensor regions) would
//     otherwise drag the whole distribution down.
// 3.  **Nearest-Rank Percentiles**: Percentiles are selected from the sorted
//     sample list by nearest rank, without interpolation. Threshold blending
//     depends on these exact values being stable across runs.

use serde::{Deserialize, Serialize};

use crate::core_modules::raster::RasterImage;

/// The three RGB-derived vegetation indices the engine computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VegetationIndex {
    /// Green Leaf Index.
    Gli,
    /// Visible Atmospherically Resistant Index.
    Vari,
    /// Triangular Greenness Index.
    Tgi,
}

impl VegetationIndex {
    pub const ALL: [VegetationIndex; 3] =
        [VegetationIndex::Gli, VegetationIndex::Vari, VegetationIndex::Tgi];

    pub fn label(&self) -> &'static str {
        match self {
            VegetationIndex::Gli => "gli",
            VegetationIndex::Vari => "vari",
            VegetationIndex::Tgi => "tgi",
        }
    }
}

/// The index triple for a single analyzed pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelIndices {
    pub gli: f64,
    pub vari: f64,
    pub tgi: f64,
}

impl PixelIndices {
    /// Computes all three indices for one pixel, or `None` when the pixel is
    /// excluded by the zero-denominator policy (2G + R + B == 0).
    ///
    /// Channels are normalized to 0..=1 before the index math. GLI and VARI
    /// are ratios and unaffected by the scale; TGI then spans roughly
    /// -95..=95 instead of tens of thousands.
    pub fn compute(red: u8, green: u8, blue: u8) -> Option<PixelIndices> {
        let gli_denominator = 2 * green as u32 + red as u32 + blue as u32;
        if gli_denominator == 0 {
            return None;
        }

        let r = red as f64 / 255.0;
        let g = green as f64 / 255.0;
        let b = blue as f64 / 255.0;

        let gli = (2.0 * g - r - b) / (2.0 * g + r + b);

        let vari_denominator = green as i32 + red as i32 - blue as i32;
        let vari = if vari_denominator == 0 {
            0.0
        } else {
            (g - r) / (g + r - b)
        };

        let tgi = -0.5 * (190.0 * (r - g) - 120.0 * (r - b));

        Some(PixelIndices { gli, vari, tgi })
    }

    pub fn get(&self, index: VegetationIndex) -> f64 {
        match index {
            VegetationIndex::Gli => self.gli,
            VegetationIndex::Vari => self.vari,
            VegetationIndex::Tgi => self.tgi,
        }
    }
}

/// The five percentile cuts sampled from one index's distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBands {
    pub p15: f64,
    pub p30: f64,
    pub p45: f64,
    pub p60: f64,
    pub p70: f64,
}

/// Accumulated statistics for a single index over one image pass.
#[derive(Debug, Clone)]
pub struct RunningStats {
    sum: f64,
    min: f64,
    max: f64,
    samples: Vec<f64>,
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            samples: Vec::new(),
        }
    }

    pub fn record(&mut self, value: f64) {
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.samples.push(value);
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Arithmetic mean of the recorded values, 0.0 when nothing was recorded.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }

    pub fn minimum(&self) -> f64 {
        if self.samples.is_empty() { 0.0 } else { self.min }
    }

    pub fn maximum(&self) -> f64 {
        if self.samples.is_empty() { 0.0 } else { self.max }
    }

    /// Nearest-rank percentile bands over the sorted sample list, or `None`
    /// when no pixel survived the exclusion policy.
    pub fn percentile_bands(&self) -> Option<PercentileBands> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Some(PercentileBands {
            p15: nearest_rank(&sorted, 15.0),
            p30: nearest_rank(&sorted, 30.0),
            p45: nearest_rank(&sorted, 45.0),
            p60: nearest_rank(&sorted, 60.0),
            p70: nearest_rank(&sorted, 70.0),
        })
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest-rank selection: the value at rank ceil(p/100 * n), 1-based.
fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let n = sorted.len();
    let rank = ((percentile / 100.0) * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// The complete first-pass product: per-index statistics plus the
/// analyzed/skipped pixel accounting every later stage depends on.
#[derive(Debug, Clone)]
pub struct IndexSurvey {
    pub gli: RunningStats,
    pub vari: RunningStats,
    pub tgi: RunningStats,
    pub analyzed: usize,
    pub skipped: usize,
}

impl IndexSurvey {
    /// Runs the full statistics pass over the raster. This must complete
    /// before thresholds can be built: the blend consumes the percentile
    /// bands of the image's own distribution.
    pub fn scan(image: &RasterImage) -> IndexSurvey {
        let mut survey = IndexSurvey {
            gli: RunningStats::new(),
            vari: RunningStats::new(),
            tgi: RunningStats::new(),
            analyzed: 0,
            skipped: 0,
        };

        for pixel in image.data().chunks_exact(4) {
            match PixelIndices::compute(pixel[0], pixel[1], pixel[2]) {
                Some(indices) => {
                    survey.gli.record(indices.gli);
                    survey.vari.record(indices.vari);
                    survey.tgi.record(indices.tgi);
                    survey.analyzed += 1;
                }
                None => survey.skipped += 1,
            }
        }

        survey
    }

    pub fn stats(&self, index: VegetationIndex) -> &RunningStats {
        match index {
            VegetationIndex::Gli => &self.gli,
            VegetationIndex::Vari => &self.vari,
            VegetationIndex::Tgi => &self.tgi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn pure_green_indices() {
        let indices = PixelIndices::compute(0, 255, 0).expect("analyzable");
        assert!((indices.gli - 1.0).abs() < 1e-9);
        assert!((indices.vari - 1.0).abs() < 1e-9);
        assert!((indices.tgi - 95.0).abs() < 1e-9);
    }

    #[test]
    fn black_pixel_is_skipped() {
        assert!(PixelIndices::compute(0, 0, 0).is_none());
    }

    #[test]
    fn vari_zero_denominator_yields_zero() {
        // G + R - B == 0 while 2G + R + B > 0.
        let indices = PixelIndices::compute(0, 100, 100).expect("analyzable");
        assert_eq!(indices.vari, 0.0);
    }

    #[test]
    fn nearest_rank_matches_hand_computed_ranks() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        // rank = ceil(p/100 * 10)
        assert_eq!(nearest_rank(&sorted, 15.0), 2.0);
        assert_eq!(nearest_rank(&sorted, 30.0), 3.0);
        assert_eq!(nearest_rank(&sorted, 45.0), 5.0);
        assert_eq!(nearest_rank(&sorted, 60.0), 6.0);
        assert_eq!(nearest_rank(&sorted, 70.0), 7.0);
    }

    #[test]
    fn survey_excludes_black_pixels_from_all_statistics() {
        let mut buffer = RgbaImage::from_pixel(4, 1, Rgba([0, 255, 0, 255]));
        buffer.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        let survey = IndexSurvey::scan(&RasterImage::new(buffer));

        assert_eq!(survey.analyzed, 3);
        assert_eq!(survey.skipped, 1);
        assert_eq!(survey.gli.count(), 3);
        assert!((survey.gli.mean() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_survey_has_no_percentiles_and_zeroed_summary() {
        let buffer = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let survey = IndexSurvey::scan(&RasterImage::new(buffer));

        assert_eq!(survey.analyzed, 0);
        assert!(survey.gli.percentile_bands().is_none());
        assert_eq!(survey.gli.mean(), 0.0);
        assert_eq!(survey.gli.minimum(), 0.0);
        assert_eq!(survey.gli.maximum(), 0.0);
    }
}
