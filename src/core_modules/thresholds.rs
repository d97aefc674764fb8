// THEORY:
// The `thresholds` module turns the strictness dial into a concrete cutoff
// set per index. Every cutoff is a blend between a fixed literature baseline
// and a "dynamic" value read off the image's own percentile bands, so the
// same dial behaves sensibly across lighting and crop conditions.
//
// The blend ratio is deliberately damped: strictness 100 still only moves a
// cutoff 60% of the way from the baseline toward the image distribution. At
// strictness 0 the baselines are returned untouched, which is what the
// calibration tests pin down.
//
// Each of the three cutoffs is blended independently. A pathological
// distribution can therefore order them non-monotonically; classification
// copes because it applies the cutoffs in a fixed precedence chain.

use serde::{Deserialize, Serialize};

use crate::core_modules::index::{IndexSurvey, PercentileBands, VegetationIndex};

/// Ceiling on how much of the image's own distribution enters the blend.
const MAX_DISTRIBUTION_INFLUENCE: f64 = 0.6;

/// Blended cutoffs are rounded: ratio indices keep 3 decimals, TGI keeps 1
/// because its range is two orders of magnitude wider.
const RATIO_DECIMALS: i32 = 3;
const TGI_DECIMALS: i32 = 1;

/// Fixed baseline bands for one index: the healthy and mild ranges collapse
/// to their midpoints, severe is the low bound itself.
struct BaselineBands {
    healthy: (f64, f64),
    mild: (f64, f64),
    severe: f64,
    decimals: i32,
}

const GLI_BASELINE: BaselineBands = BaselineBands {
    healthy: (0.20, 0.40),
    mild: (0.10, 0.20),
    severe: 0.05,
    decimals: RATIO_DECIMALS,
};

const VARI_BASELINE: BaselineBands = BaselineBands {
    healthy: (0.15, 0.35),
    mild: (0.05, 0.15),
    severe: 0.00,
    decimals: RATIO_DECIMALS,
};

const TGI_BASELINE: BaselineBands = BaselineBands {
    healthy: (15.0, 45.0),
    mild: (5.0, 15.0),
    severe: 2.0,
    decimals: TGI_DECIMALS,
};

impl BaselineBands {
    fn for_index(index: VegetationIndex) -> &'static BaselineBands {
        match index {
            VegetationIndex::Gli => &GLI_BASELINE,
            VegetationIndex::Vari => &VARI_BASELINE,
            VegetationIndex::Tgi => &TGI_BASELINE,
        }
    }

    fn healthy_midpoint(&self) -> f64 {
        (self.healthy.0 + self.healthy.1) / 2.0
    }

    fn mild_midpoint(&self) -> f64 {
        (self.mild.0 + self.mild.1) / 2.0
    }
}

/// The three cutoffs used to bucket one index's values.
///
/// Expected ordering is healthy >= mild >= severe, by construction rather
/// than enforcement: see the module header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub healthy: f64,
    pub mild: f64,
    pub severe: f64,
}

/// The full cutoff snapshot for one invocation, kept on the result for
/// traceability: re-running with the same set reproduces the classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveThresholds {
    pub gli: ThresholdSet,
    pub vari: ThresholdSet,
    pub tgi: ThresholdSet,
}

impl AdaptiveThresholds {
    /// Blends baselines toward the surveyed percentile bands. An image with
    /// zero analyzable pixels has no bands and falls back to pure baselines.
    pub fn build(strictness: u8, survey: &IndexSurvey) -> AdaptiveThresholds {
        let mix = (strictness.min(100) as f64 / 100.0) * MAX_DISTRIBUTION_INFLUENCE;
        AdaptiveThresholds {
            gli: build_set(VegetationIndex::Gli, survey, mix),
            vari: build_set(VegetationIndex::Vari, survey, mix),
            tgi: build_set(VegetationIndex::Tgi, survey, mix),
        }
    }

    pub fn get(&self, index: VegetationIndex) -> &ThresholdSet {
        match index {
            VegetationIndex::Gli => &self.gli,
            VegetationIndex::Vari => &self.vari,
            VegetationIndex::Tgi => &self.tgi,
        }
    }
}

fn build_set(index: VegetationIndex, survey: &IndexSurvey, mix: f64) -> ThresholdSet {
    let baseline = BaselineBands::for_index(index);
    let stats = survey.stats(index);

    let (healthy_dynamic, mild_dynamic, severe_dynamic) = match stats.percentile_bands() {
        Some(bands) => (
            (bands.p60 + bands.p70 + bands.p45) / 3.0,
            (bands.p30 + bands.p45) / 2.0,
            severe_dynamic(&bands, stats.minimum()),
        ),
        // No distribution to adapt to: the blend collapses to the baseline.
        None => (
            baseline.healthy_midpoint(),
            baseline.mild_midpoint(),
            baseline.severe,
        ),
    };

    ThresholdSet {
        healthy: blend(baseline.healthy_midpoint(), healthy_dynamic, mix, baseline.decimals),
        mild: blend(baseline.mild_midpoint(), mild_dynamic, mix, baseline.decimals),
        severe: blend(baseline.severe, severe_dynamic, mix, baseline.decimals),
    }
}

/// Severe adapts to the 15th percentile, falling back to the observed
/// minimum when the band is not finite.
fn severe_dynamic(bands: &PercentileBands, observed_min: f64) -> f64 {
    if bands.p15.is_finite() { bands.p15 } else { observed_min }
}

fn blend(baseline: f64, dynamic: f64, mix: f64, decimals: i32) -> f64 {
    round_to(baseline + (dynamic - baseline) * mix, decimals)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::index::IndexSurvey;
    use crate::core_modules::raster::RasterImage;
    use image::{Rgba, RgbaImage};

    fn survey_of(rgba: [u8; 4]) -> IndexSurvey {
        IndexSurvey::scan(&RasterImage::new(RgbaImage::from_pixel(10, 10, Rgba(rgba))))
    }

    #[test]
    fn strictness_zero_returns_pure_baselines() {
        let survey = survey_of([0, 255, 0, 255]);
        let thresholds = AdaptiveThresholds::build(0, &survey);

        assert_eq!(
            thresholds.gli,
            ThresholdSet { healthy: 0.300, mild: 0.150, severe: 0.050 }
        );
        assert_eq!(
            thresholds.vari,
            ThresholdSet { healthy: 0.250, mild: 0.100, severe: 0.000 }
        );
        assert_eq!(
            thresholds.tgi,
            ThresholdSet { healthy: 30.0, mild: 10.0, severe: 2.0 }
        );
    }

    #[test]
    fn strictness_is_damped_to_sixty_percent() {
        // Uniform GLI of 1.0: all percentiles are 1.0, so at strictness 100
        // healthy moves exactly 60% of the way from 0.3 toward 1.0.
        let survey = survey_of([0, 255, 0, 255]);
        let thresholds = AdaptiveThresholds::build(100, &survey);
        assert!((thresholds.gli.healthy - 0.720).abs() < 1e-9);
    }

    #[test]
    fn tgi_rounds_to_one_decimal() {
        let survey = survey_of([0, 255, 0, 255]);
        let thresholds = AdaptiveThresholds::build(50, &survey);
        // healthy = 30 + (95 - 30) * 0.3 = 49.5
        assert!((thresholds.tgi.healthy - 49.5).abs() < 1e-9);
        assert_eq!(round_to(thresholds.tgi.healthy, 1), thresholds.tgi.healthy);
    }

    #[test]
    fn degenerate_image_falls_back_to_baselines_at_any_strictness() {
        let survey = survey_of([0, 0, 0, 255]);
        assert_eq!(survey.analyzed, 0);
        let thresholds = AdaptiveThresholds::build(85, &survey);
        assert_eq!(
            thresholds.gli,
            ThresholdSet { healthy: 0.300, mild: 0.150, severe: 0.050 }
        );
    }

    #[test]
    fn blending_is_deterministic() {
        let survey = survey_of([30, 200, 40, 255]);
        let first = AdaptiveThresholds::build(70, &survey);
        let second = AdaptiveThresholds::build(70, &survey);
        assert_eq!(first, second);
    }
}
