//! Error types for the engine module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a transcoding engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine core executable not found.
    #[error("Engine core not found at path: {path}")]
    CoreNotFound { path: PathBuf },

    /// Engine core found but could not be loaded.
    #[error("Engine failed to load: {reason}")]
    LoadFailed { reason: String },

    /// An operation was issued before `initialize` completed.
    #[error("Engine is not loaded")]
    NotLoaded,

    /// Entry names must be plain file names.
    #[error("Invalid entry name: {name}")]
    InvalidEntryName { name: String },

    /// The transcode command failed.
    #[error("Transcode failed: {reason}")]
    TranscodeFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The command finished without producing the named output.
    #[error("Output not produced: {name}")]
    OutputMissing { name: String },

    /// I/O error inside the engine scratch filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a new load failed error.
    pub fn load_failed(reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            reason: reason.into(),
        }
    }

    /// Creates a new transcode failed error with diagnostic output.
    pub fn transcode_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::TranscodeFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Whether this error came from loading the engine.
    pub fn is_load_error(&self) -> bool {
        matches!(self, Self::CoreNotFound { .. } | Self::LoadFailed { .. })
    }
}
