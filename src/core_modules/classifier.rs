// THEORY:
// The `classifier` module runs the second full pass over the pixel buffer.
// Armed with the adaptive thresholds, it assigns every analyzable pixel a
// severity bucket per index, combines the three buckets into the primary
// diagnosis, and fills all four heatmap buffers inside the same loop. This
// is the most performance-sensitive stage: one O(width x height) walk total,
// never one walk per heatmap.
//
// Key architectural principles:
// 1.  **Fixed Precedence Chain**: Per-index bucketing applies the cutoffs in
//     a fixed order: value >= healthy, else value >= mild, else
//     value <= severe, else moderate. Note the inverted comparator for
//     severe: it marks the low end of the scale, and moderate is the gap
//     between "not good enough for mild" and "not bad enough for severe".
// 2.  **Combined Score**: The primary diagnosis averages the three bucket
//     scores (healthy 3, mild 2, moderate 1, severe 0) and re-buckets the
//     mean at 2.4 / 1.5 / 0.8. Per-index buckets stay purely threshold-based.
// 3.  **Side Products In-Pass**: Agreement counting, the vegetation mask and
//     the per-pixel severe/analyzed flags consumed by the hotspot detector
//     are all collected during the same walk.

use serde::{Deserialize, Serialize};

use crate::core_modules::index::{PixelIndices, VegetationIndex};
use crate::core_modules::raster::RasterImage;
use crate::core_modules::render;
use crate::core_modules::thresholds::{AdaptiveThresholds, ThresholdSet};

/// Combined-score cutoffs for re-bucketing the per-pixel mean score.
const COMBINED_HEALTHY_SCORE: f64 = 2.4;
const COMBINED_MILD_SCORE: f64 = 1.5;
const COMBINED_MODERATE_SCORE: f64 = 0.8;

/// Mean byte brightness a pixel must exceed to count as vegetation.
const VEGETATION_BRIGHTNESS_FLOOR: u32 = 30;

/// The four severity levels, ordered healthy > mild > moderate > severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeverityBucket {
    Healthy,
    Mild,
    Moderate,
    Severe,
}

impl SeverityBucket {
    pub const ALL: [SeverityBucket; 4] = [
        SeverityBucket::Healthy,
        SeverityBucket::Mild,
        SeverityBucket::Moderate,
        SeverityBucket::Severe,
    ];

    /// Scoring weight used only for the combined diagnosis.
    pub const fn score(&self) -> u8 {
        match self {
            SeverityBucket::Healthy => 3,
            SeverityBucket::Mild => 2,
            SeverityBucket::Moderate => 1,
            SeverityBucket::Severe => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SeverityBucket::Healthy => "healthy",
            SeverityBucket::Mild => "mild",
            SeverityBucket::Moderate => "moderate",
            SeverityBucket::Severe => "severe",
        }
    }

    /// Buckets one index value through the fixed precedence chain.
    pub fn classify(value: f64, thresholds: &ThresholdSet) -> SeverityBucket {
        if value >= thresholds.healthy {
            SeverityBucket::Healthy
        } else if value >= thresholds.mild {
            SeverityBucket::Mild
        } else if value <= thresholds.severe {
            SeverityBucket::Severe
        } else {
            SeverityBucket::Moderate
        }
    }

    /// Re-buckets a combined mean score.
    pub fn from_combined_score(score: f64) -> SeverityBucket {
        if score >= COMBINED_HEALTHY_SCORE {
            SeverityBucket::Healthy
        } else if score >= COMBINED_MILD_SCORE {
            SeverityBucket::Mild
        } else if score >= COMBINED_MODERATE_SCORE {
            SeverityBucket::Moderate
        } else {
            SeverityBucket::Severe
        }
    }
}

/// Pixel counts per severity bucket for one index (or the combined view).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationMatrix {
    pub healthy: usize,
    pub mild: usize,
    pub moderate: usize,
    pub severe: usize,
}

impl ClassificationMatrix {
    pub fn record(&mut self, bucket: SeverityBucket) {
        match bucket {
            SeverityBucket::Healthy => self.healthy += 1,
            SeverityBucket::Mild => self.mild += 1,
            SeverityBucket::Moderate => self.moderate += 1,
            SeverityBucket::Severe => self.severe += 1,
        }
    }

    pub fn count(&self, bucket: SeverityBucket) -> usize {
        match bucket {
            SeverityBucket::Healthy => self.healthy,
            SeverityBucket::Mild => self.mild,
            SeverityBucket::Moderate => self.moderate,
            SeverityBucket::Severe => self.severe,
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.mild + self.moderate + self.severe
    }

    /// The bucket holding the most pixels. Ties resolve toward the healthier
    /// bucket, matching the `ALL` ordering.
    pub fn dominant(&self) -> SeverityBucket {
        let mut best = SeverityBucket::Healthy;
        let mut best_count = self.healthy;
        for bucket in SeverityBucket::ALL {
            if self.count(bucket) > best_count {
                best = bucket;
                best_count = self.count(bucket);
            }
        }
        best
    }
}

/// The four heatmap color buffers, flat RGBA at source resolution.
#[derive(Debug, Clone)]
pub struct HeatmapSet {
    pub gli: Vec<u8>,
    pub vari: Vec<u8>,
    pub tgi: Vec<u8>,
    pub combined: Vec<u8>,
}

impl HeatmapSet {
    pub fn get(&self, index: VegetationIndex) -> &[u8] {
        match index {
            VegetationIndex::Gli => &self.gli,
            VegetationIndex::Vari => &self.vari,
            VegetationIndex::Tgi => &self.tgi,
        }
    }
}

/// Everything the classification pass produces in one walk.
#[derive(Debug, Clone)]
pub struct ClassifiedImage {
    pub gli: ClassificationMatrix,
    pub vari: ClassificationMatrix,
    pub tgi: ClassificationMatrix,
    pub combined: ClassificationMatrix,
    pub heatmaps: HeatmapSet,
    /// Per-pixel flag: true when the pixel survived the exclusion policy.
    pub analyzed: Vec<bool>,
    /// Per-pixel flag: true when any index bucketed the pixel as severe.
    /// This is what the hotspot grid aggregates.
    pub severe_any: Vec<bool>,
    /// Pixels where all three indices agreed on the same bucket.
    pub agreement: usize,
    /// Pixels passing the vegetation mask (auxiliary signal only).
    pub vegetation: usize,
    pub combined_score_sum: f64,
    pub analyzed_count: usize,
    pub skipped_count: usize,
}

impl ClassifiedImage {
    pub fn matrix(&self, index: VegetationIndex) -> &ClassificationMatrix {
        match index {
            VegetationIndex::Gli => &self.gli,
            VegetationIndex::Vari => &self.vari,
            VegetationIndex::Tgi => &self.tgi,
        }
    }

    /// Fraction of analyzed pixels where all three indices agreed, percent.
    pub fn agreement_pct(&self) -> f64 {
        if self.analyzed_count == 0 {
            0.0
        } else {
            self.agreement as f64 / self.analyzed_count as f64 * 100.0
        }
    }

    pub fn vegetation_pct(&self) -> f64 {
        if self.analyzed_count == 0 {
            0.0
        } else {
            self.vegetation as f64 / self.analyzed_count as f64 * 100.0
        }
    }

    pub fn combined_average(&self) -> f64 {
        if self.analyzed_count == 0 {
            0.0
        } else {
            self.combined_score_sum / self.analyzed_count as f64
        }
    }
}

/// The second full pass: buckets every analyzable pixel per index and
/// combined, and fills all four heatmap buffers in the same loop.
pub fn classify_image(image: &RasterImage, thresholds: &AdaptiveThresholds) -> ClassifiedImage {
    let pixel_count = image.pixel_count();
    let buffer_len = pixel_count * 4;
    let mut result = ClassifiedImage {
        gli: ClassificationMatrix::default(),
        vari: ClassificationMatrix::default(),
        tgi: ClassificationMatrix::default(),
        combined: ClassificationMatrix::default(),
        heatmaps: HeatmapSet {
            gli: vec![0u8; buffer_len],
            vari: vec![0u8; buffer_len],
            tgi: vec![0u8; buffer_len],
            combined: vec![0u8; buffer_len],
        },
        analyzed: vec![false; pixel_count],
        severe_any: vec![false; pixel_count],
        agreement: 0,
        vegetation: 0,
        combined_score_sum: 0.0,
        analyzed_count: 0,
        skipped_count: 0,
    };

    let data = image.data();
    for i in 0..pixel_count {
        let offset = i * 4;
        let (red, green, blue) = (data[offset], data[offset + 1], data[offset + 2]);

        // Skipped pixels keep the transparent zero-fill in every heatmap.
        let Some(indices) = PixelIndices::compute(red, green, blue) else {
            result.skipped_count += 1;
            continue;
        };

        let gli_bucket = SeverityBucket::classify(indices.gli, &thresholds.gli);
        let vari_bucket = SeverityBucket::classify(indices.vari, &thresholds.vari);
        let tgi_bucket = SeverityBucket::classify(indices.tgi, &thresholds.tgi);

        result.gli.record(gli_bucket);
        result.vari.record(vari_bucket);
        result.tgi.record(tgi_bucket);

        let score = (gli_bucket.score() as f64
            + vari_bucket.score() as f64
            + tgi_bucket.score() as f64)
            / 3.0;
        let combined_bucket = SeverityBucket::from_combined_score(score);
        result.combined.record(combined_bucket);
        result.combined_score_sum += score;

        if gli_bucket == vari_bucket && vari_bucket == tgi_bucket {
            result.agreement += 1;
        }

        if is_vegetation(red, green, blue, indices.gli, &thresholds.gli) {
            result.vegetation += 1;
        }

        result.analyzed[i] = true;
        result.severe_any[i] = gli_bucket == SeverityBucket::Severe
            || vari_bucket == SeverityBucket::Severe
            || tgi_bucket == SeverityBucket::Severe;
        result.analyzed_count += 1;

        write_color(&mut result.heatmaps.gli, offset, render::bucket_color(gli_bucket));
        write_color(&mut result.heatmaps.vari, offset, render::bucket_color(vari_bucket));
        write_color(&mut result.heatmaps.tgi, offset, render::bucket_color(tgi_bucket));
        write_color(&mut result.heatmaps.combined, offset, render::bucket_color(combined_bucket));
    }

    result
}

/// Vegetation mask: bright enough, green not dominated by red or blue, and
/// GLI above the mild cutoff. Auxiliary signal; never gates classification.
fn is_vegetation(red: u8, green: u8, blue: u8, gli: f64, thresholds: &ThresholdSet) -> bool {
    let brightness = (red as u32 + green as u32 + blue as u32) / 3;
    brightness > VEGETATION_BRIGHTNESS_FLOOR
        && green >= red
        && green >= blue
        && gli > thresholds.mild
}

fn write_color(buffer: &mut [u8], offset: usize, color: [u8; 4]) {
    buffer[offset..offset + 4].copy_from_slice(&color);
}
