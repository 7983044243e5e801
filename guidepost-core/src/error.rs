use thiserror::Error;

/// All errors produced by guidepost-core.
///
/// The decision engine itself never fails; these cover the adapters and the
/// service lifecycle around it.
#[derive(Debug, Error)]
pub enum GuidanceError {
    #[error("frame source error: {0}")]
    FrameSource(String),

    #[error("detector error: {0}")]
    Detector(String),

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("speech renderer error: {0}")]
    Speech(String),

    #[error("actuator link error: {0}")]
    Actuator(String),

    #[error("guidance service is already running")]
    AlreadyRunning,

    #[error("guidance service is not running")]
    NotRunning,

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GuidanceError>;
