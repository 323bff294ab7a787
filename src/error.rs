//! Request-path error kinds, surfaced to the caller as `{error}` JSON.

/// Errors a single prediction request can produce. Each is local to that
/// request; no variant poisons another session's state.
#[derive(Debug)]
pub enum PredictError {
    /// The uploaded frame could not be base64-decoded or image-decoded.
    InvalidInput(String),
    /// The remote detection service answered with an error status.
    Backend(String),
    /// A model artifact was missing or inconsistent at inference time.
    Artifact(String),
}

impl std::fmt::Display for PredictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictError::InvalidInput(msg) => write!(f, "Invalid image data: {}", msg),
            PredictError::Backend(msg) => write!(f, "Backend error: {}", msg),
            PredictError::Artifact(msg) => write!(f, "Artifact error: {}", msg),
        }
    }
}

impl std::error::Error for PredictError {}

impl From<reqwest::Error> for PredictError {
    fn from(e: reqwest::Error) -> Self {
        PredictError::Backend(e.to_string())
    }
}
