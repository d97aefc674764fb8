// THEORY:
// The `pipeline` module is the top-level API for the analysis engine. One
// invocation is a strict sequence: decode, normalize resolution, survey the
// index distribution, build adaptive thresholds, classify, then run the two
// post-processing stages (hotspots and zones) on the classified data and
// package everything into a single `AnalysisResult`. Each stage consumes the
// previous stage's complete output, so the order is not negotiable:
// thresholds need the full percentile sample, classification needs the
// thresholds.
//
// The pipeline is a pure function of (image bytes, config): no state is
// shared across invocations and identical inputs reproduce byte-identical
// results. Progress reporting is a side channel only: an optional observer
// is invoked at six fixed checkpoints, in order, at most once each, and can
// never alter the computation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core_modules::classifier::{classify_image, ClassificationMatrix, SeverityBucket};
use crate::core_modules::hotspots::{detect_hotspots, Hotspot};
use crate::core_modules::index::{IndexSurvey, PercentileBands, VegetationIndex};
use crate::core_modules::raster::{PngCodec, RasterDecoder, RasterEncoder, DEFAULT_MAX_DIMENSION};
use crate::core_modules::render::blend_overlay;
use crate::core_modules::thresholds::{AdaptiveThresholds, ThresholdSet};
use crate::core_modules::zones::{cluster_zones, render_zone_overlay, Zone};
use crate::error::Result;

/// Tunable knobs for one analysis invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// 0..=100 dial controlling how far thresholds adapt toward the image's
    /// own distribution. Values above 100 are clamped.
    pub strictness: u8,
    /// Requested management-zone count, clamped to 2..=6 at the clustering
    /// stage.
    pub zone_count: usize,
    /// Longest-side cap applied while normalizing the decoded image.
    pub max_dimension: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strictness: 50,
            zone_count: 4,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// The fixed progress checkpoints, in invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStage {
    PreparingImage,
    AdjustingResolution,
    CalculatingBaseIndices,
    ClassifyingPixels,
    SummarizingMetrics,
    GeneratingMaps,
}

impl ProgressStage {
    pub const SEQUENCE: [ProgressStage; 6] = [
        ProgressStage::PreparingImage,
        ProgressStage::AdjustingResolution,
        ProgressStage::CalculatingBaseIndices,
        ProgressStage::ClassifyingPixels,
        ProgressStage::SummarizingMetrics,
        ProgressStage::GeneratingMaps,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ProgressStage::PreparingImage => "preparing image",
            ProgressStage::AdjustingResolution => "adjusting resolution",
            ProgressStage::CalculatingBaseIndices => "calculating base indices",
            ProgressStage::ClassifyingPixels => "classifying pixels",
            ProgressStage::SummarizingMetrics => "summarizing metrics",
            ProgressStage::GeneratingMaps => "generating maps",
        }
    }
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything reported for one vegetation index: classification counts,
/// summary statistics, the exact thresholds and percentile bands used, and
/// the rendered maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub matrix: ClassificationMatrix,
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub thresholds: ThresholdSet,
    pub percentiles: Option<PercentileBands>,
    pub heatmap_png: Vec<u8>,
    pub overlay_png: Vec<u8>,
}

/// The combined (primary) diagnosis view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedReport {
    pub matrix: ClassificationMatrix,
    /// Mean of the per-pixel combined scores over analyzed pixels.
    pub average_score: f64,
    pub dominant: SeverityBucket,
    pub heatmap_png: Vec<u8>,
    pub overlay_png: Vec<u8>,
}

/// The complete output of one analysis invocation. Owned by the caller;
/// nothing in it refers back to engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Working dimensions after resolution normalization.
    pub width: u32,
    pub height: u32,
    pub original_png: Vec<u8>,
    pub gli: IndexReport,
    pub vari: IndexReport,
    pub tgi: IndexReport,
    pub combined: CombinedReport,
    pub zone_overlay_png: Vec<u8>,
    /// Percentage of analyzed pixels on which all three indices agreed.
    pub agreement_pct: f64,
    /// Percentage of analyzed pixels passing the vegetation mask.
    pub vegetation_pct: f64,
    pub hotspots: Vec<Hotspot>,
    pub zones: Vec<Zone>,
    pub analyzed_pixels: usize,
    pub skipped_pixels: usize,
    /// Effective (clamped) parameters, kept for reproducibility.
    pub strictness: u8,
    pub zone_count: usize,
}

impl AnalysisResult {
    pub fn index_report(&self, index: VegetationIndex) -> &IndexReport {
        match index {
            VegetationIndex::Gli => &self.gli,
            VegetationIndex::Vari => &self.vari,
            VegetationIndex::Tgi => &self.tgi,
        }
    }
}

/// The main, top-level struct for the analysis engine.
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    codec: PngCodec,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config, codec: PngCodec }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Runs the full analysis without progress reporting.
    pub fn analyze(&self, image_bytes: &[u8]) -> Result<AnalysisResult> {
        self.analyze_with_progress(image_bytes, &mut |_| {})
    }

    /// Runs the full analysis, invoking `observer` at each checkpoint.
    pub fn analyze_with_progress(
        &self,
        image_bytes: &[u8],
        observer: &mut dyn FnMut(ProgressStage),
    ) -> Result<AnalysisResult> {
        // --- 1. Decode ---
        observer(ProgressStage::PreparingImage);
        let decoded = self.codec.decode(image_bytes)?;
        debug!(width = decoded.width(), height = decoded.height(), "image decoded");

        // --- 2. Resolution Normalization ---
        observer(ProgressStage::AdjustingResolution);
        let image = decoded.downscaled(self.config.max_dimension);

        // --- 3. Index Survey (first full pass) ---
        observer(ProgressStage::CalculatingBaseIndices);
        let survey = IndexSurvey::scan(&image);
        debug!(
            analyzed = survey.analyzed,
            skipped = survey.skipped,
            "index survey complete"
        );

        // --- 4. Adaptive Thresholds ---
        let strictness = self.config.strictness.min(100);
        let thresholds = AdaptiveThresholds::build(strictness, &survey);

        // --- 5. Classification (second full pass) ---
        observer(ProgressStage::ClassifyingPixels);
        let classified = classify_image(&image, &thresholds);

        // --- 6. Spatial Summaries ---
        observer(ProgressStage::SummarizingMetrics);
        let hotspots = detect_hotspots(&classified, image.width(), image.height());
        let zone_map = cluster_zones(
            &classified.heatmaps.combined,
            image.width(),
            image.height(),
            self.config.zone_count,
        );
        info!(
            analyzed = classified.analyzed_count,
            hotspots = hotspots.len(),
            zones = zone_map.zones.len(),
            dominant = classified.combined.dominant().label(),
            "analysis summarized"
        );

        // --- 7. Map Generation & Assembly ---
        observer(ProgressStage::GeneratingMaps);
        let index_report = |index: VegetationIndex| -> Result<IndexReport> {
            let stats = survey.stats(index);
            let heatmap = classified.heatmaps.get(index);
            Ok(IndexReport {
                matrix: *classified.matrix(index),
                average: stats.mean(),
                minimum: stats.minimum(),
                maximum: stats.maximum(),
                thresholds: *thresholds.get(index),
                percentiles: stats.percentile_bands(),
                heatmap_png: PngCodec::encode_rgba_bytes(heatmap, image.width(), image.height())?,
                overlay_png: PngCodec::encode_rgba(&blend_overlay(&image, heatmap))?,
            })
        };

        let combined = CombinedReport {
            matrix: classified.combined,
            average_score: classified.combined_average(),
            dominant: classified.combined.dominant(),
            heatmap_png: PngCodec::encode_rgba_bytes(
                &classified.heatmaps.combined,
                image.width(),
                image.height(),
            )?,
            overlay_png: PngCodec::encode_rgba(&blend_overlay(
                &image,
                &classified.heatmaps.combined,
            ))?,
        };

        Ok(AnalysisResult {
            width: image.width(),
            height: image.height(),
            original_png: self.codec.encode(&image)?,
            gli: index_report(VegetationIndex::Gli)?,
            vari: index_report(VegetationIndex::Vari)?,
            tgi: index_report(VegetationIndex::Tgi)?,
            combined,
            zone_overlay_png: PngCodec::encode_rgba(&render_zone_overlay(&image, &zone_map))?,
            agreement_pct: classified.agreement_pct(),
            vegetation_pct: classified.vegetation_pct(),
            hotspots,
            zones: zone_map.zones,
            analyzed_pixels: classified.analyzed_count,
            skipped_pixels: classified.skipped_count,
            strictness,
            zone_count: self.config.zone_count.clamp(2, 6),
        })
    }
}

impl Default for AnalysisPipeline {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}
