//! Error types for the conversion session.

use thiserror::Error;

use crate::engine::EngineError;

/// Shown when the engine cannot be loaded.
pub const ENGINE_LOAD_MESSAGE: &str =
    "Failed to load video processing engine. Please restart the application.";

/// Shown when a selected file is not a video.
pub const INVALID_FILE_MESSAGE: &str = "Please upload a valid video file.";

/// Shown when a conversion run fails, whatever the cause.
pub const CONVERSION_FAILED_MESSAGE: &str =
    "An error occurred during conversion. Please try again with a different file.";

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The engine could not be loaded. Fatal for the session.
    #[error("Engine failed to load: {reason}")]
    EngineLoad { reason: String },

    /// The selected file does not declare a video type.
    #[error("Invalid file {name:?}: declared type {mime_type:?} is not video/*")]
    InvalidFile { name: String, mime_type: String },

    /// The operation is not valid in the current state.
    #[error("Session not ready: {reason}")]
    NotReady { reason: String },

    /// The input cannot change while a conversion runs.
    #[error("A conversion is in progress")]
    Busy,

    /// The engine failed during a run.
    #[error("Conversion failed: {reason}")]
    Transcode { reason: String },

    /// The engine finished without producing the output.
    #[error("Conversion produced no output: {name}")]
    OutputMissing { name: String },

    /// The session was disposed.
    #[error("Session has been disposed")]
    Disposed,
}

impl SessionError {
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self::NotReady {
            reason: reason.into(),
        }
    }

    /// Maps an engine failure during a run. The cause is kept for logs only.
    /// Every cause except a missing output, including a vanished core, is a
    /// recoverable transcode failure.
    pub fn from_engine(err: EngineError) -> Self {
        match err {
            EngineError::OutputMissing { name } => Self::OutputMissing { name },
            other => Self::Transcode {
                reason: other.to_string(),
            },
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::EngineLoad { .. } => ENGINE_LOAD_MESSAGE.to_string(),
            Self::InvalidFile { .. } => INVALID_FILE_MESSAGE.to_string(),
            Self::Transcode { .. } | Self::OutputMissing { .. } => {
                CONVERSION_FAILED_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the user can retry after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::EngineLoad { .. } | Self::Disposed)
    }
}
