use super::result::Detection;

/// Why an inference call produced no detections.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("api request timed out")]
    Timeout,

    #[error("api connection error: {0}")]
    Connection(String),

    #[error("bad request - check image format")]
    BadRequest,

    #[error("authentication error - check api key")]
    Unauthorized,

    #[error("model not found - check model endpoint")]
    NotFound,

    #[error("api error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed api response: {0}")]
    Malformed(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Coarse failure classes, for diagnostics and loop outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connection,
    BadRequest,
    Unauthorized,
    NotFound,
    Status,
    Malformed,
    Encode,
}

impl InferenceError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 => InferenceError::BadRequest,
            401 | 403 => InferenceError::Unauthorized,
            404 => InferenceError::NotFound,
            _ => InferenceError::Status { status, body },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            InferenceError::Timeout => FailureKind::Timeout,
            InferenceError::Connection(_) => FailureKind::Connection,
            InferenceError::BadRequest => FailureKind::BadRequest,
            InferenceError::Unauthorized => FailureKind::Unauthorized,
            InferenceError::NotFound => FailureKind::NotFound,
            InferenceError::Status { .. } => FailureKind::Status,
            InferenceError::Malformed(_) => FailureKind::Malformed,
            InferenceError::Encode(_) => FailureKind::Encode,
        }
    }
}

/// Remote object detection.
///
/// Implementations receive an already encoded JPEG and must bound their own
/// request time so the caller's loop never hangs.
pub trait DetectionApi: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn detect(&mut self, jpeg: &[u8]) -> Result<Vec<Detection>, InferenceError>;
}
