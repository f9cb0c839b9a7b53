use std::path::PathBuf;

/// Fatal conditions for a single modality's tick. The pipeline surfaces these through its
/// error callback and drops the offending video source.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Model file not found: {0:?}")]
    ModelNotFound(PathBuf),
    #[error("Tensor shape mismatch: {0}")]
    TensorShape(String),
    #[error("Capture failed: {0}")]
    Capture(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}
