// THEORY:
// This file is the main entry point for the `verdant_vision` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the
// public API exposed to external consumers (the upload form, history viewer
// and export collaborators of the surrounding application).
//
// The primary surface is the `AnalysisPipeline` and its associated data
// structures (`AnalysisConfig`, `AnalysisResult`, `ProgressStage`). The
// internal stage modules (`core_modules`) stay reachable for callers that
// need individual pieces (the severity palette, the raster codec seam), but
// the intended interface is one pipeline in, one result out.

pub mod batch_pipeline;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use batch_pipeline::BatchAnalyzer;
pub use error::{AnalysisError, Result};
pub use pipeline::{AnalysisConfig, AnalysisPipeline, AnalysisResult, ProgressStage};
