use thiserror::Error;

/// Failures the analysis engine can surface to a caller.
///
/// Decoding is the only failure mode intrinsic to the algorithm; encoding and
/// worker errors can only occur while packaging results or when using the
/// batch facade.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to encode result image: {0}")]
    Encode(image::ImageError),

    #[error("analysis worker unavailable")]
    WorkerUnavailable,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
