use thiserror::Error;

/// Failure opening or running the audio capture device.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device available")]
    NoDevice,

    #[error("input device not found: {0}")]
    DeviceNotFound(String),

    #[error("unsupported capture format: {0}")]
    UnsupportedFormat(String),

    #[error("audio stream error: {0}")]
    Stream(String),
}

/// Engine-level failure surfaced to the presentation layer. Each variant
/// maps to one stable `kind()` string for machine-readable handling.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(#[from] CaptureError),

    #[error("failed to create remote session: {0}")]
    SessionCreateFailed(String),

    #[error("upload of chunk {index} failed: {reason}")]
    UploadFailed { index: u32, reason: String },

    #[error("status poll failed: {0}")]
    PollFailed(String),

    #[error("failed to mark session complete: {0}")]
    SessionCompletionFailed(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::CaptureUnavailable(_) => "capture_unavailable",
            EngineError::SessionCreateFailed(_) => "session_create_failed",
            EngineError::UploadFailed { .. } => "upload_failed",
            EngineError::PollFailed(_) => "poll_failed",
            EngineError::SessionCompletionFailed(_) => "session_completion_failed",
        }
    }
}
