use thiserror::Error;

/// Conditions a caller of the pipeline has to tell apart.
///
/// Missing or broken detectors are deliberately absent: they degrade the result to
/// fewer detections and surface as a [`crate::PipelineWarning`] instead.
#[derive(Debug, Error)]
pub enum RedactError {
    #[error("could not read image: {0}")]
    ImageDecode(String),

    #[error("image dimensions are zero")]
    ZeroDimensions,

    #[error("failed to encode redacted image: {0}")]
    Encode(String),
}
