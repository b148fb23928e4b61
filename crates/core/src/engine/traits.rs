//! Trait definitions for the engine module.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use super::error::EngineError;

/// A progress report from a running `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngineProgress {
    /// Completed fraction in [0, 1].
    pub ratio: f64,
    /// Media time processed so far, when known.
    pub time_secs: Option<f64>,
}

impl EngineProgress {
    /// Creates a progress report from a bare ratio.
    pub fn ratio(ratio: f64) -> Self {
        Self {
            ratio,
            time_secs: None,
        }
    }
}

/// An engine that can transcode a blob held in its scratch filesystem.
///
/// Engines are caller-owned handles: the owning process decides when to
/// `initialize` and `dispose` them.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Loads engine resources. Calling it again after success is a no-op.
    async fn initialize(&self) -> Result<(), EngineError>;

    /// Whether `initialize` has completed and `dispose` has not been called.
    async fn is_loaded(&self) -> bool;

    /// Stores bytes under `name` in the engine scratch filesystem.
    async fn write_input(&self, name: &str, data: Bytes) -> Result<(), EngineError>;

    /// Runs a command against previously written inputs.
    ///
    /// Progress ratios are sent over `progress_tx` on a best-effort basis.
    /// If the receiver is dropped, execution continues without reporting.
    async fn execute(
        &self,
        args: &[String],
        progress_tx: mpsc::Sender<EngineProgress>,
    ) -> Result<(), EngineError>;

    /// Reads the bytes the last command produced under `name`.
    async fn read_output(&self, name: &str) -> Result<Bytes, EngineError>;

    /// Releases a named entry. Missing entries are ignored.
    async fn remove(&self, name: &str);

    /// Releases the scratch filesystem.
    async fn dispose(&self);
}

/// Checks that `name` is a plain file name inside the scratch filesystem.
pub fn validate_entry_name(name: &str) -> Result<(), EngineError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');

    if invalid {
        return Err(EngineError::InvalidEntryName {
            name: name.to_string(),
        });
    }
    Ok(())
}
