//! Types for the conversion session.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::OUTPUT_MIME_TYPE;
use crate::input::InputSummary;

/// Lifecycle state of a conversion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The engine is being loaded.
    EngineLoading,
    /// Engine ready, no input.
    Idle,
    /// An input is held and no output corresponds to it.
    InputReady,
    /// A conversion run is in flight.
    Converting,
    /// The output of the current input is available.
    OutputReady,
    /// The engine failed to load. Terminal.
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EngineLoading => "engine_loading",
            Self::Idle => "idle",
            Self::InputReady => "input_ready",
            Self::Converting => "converting",
            Self::OutputReady => "output_ready",
            Self::Failed => "failed",
        }
    }
}

/// The produced MP4.
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    data: Bytes,
    produced_at: DateTime<Utc>,
    elapsed_ms: u64,
}

impl OutputArtifact {
    pub fn new(data: Bytes, elapsed_ms: u64) -> Self {
        Self {
            data,
            produced_at: Utc::now(),
            elapsed_ms,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn mime_type(&self) -> &'static str {
        OUTPUT_MIME_TYPE
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn summary(&self) -> OutputSummary {
        OutputSummary {
            mime_type: self.mime_type().to_string(),
            size_bytes: self.size_bytes(),
            produced_at: self.produced_at,
            elapsed_ms: self.elapsed_ms,
        }
    }
}

/// Metadata of the current output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSummary {
    pub mime_type: String,
    pub size_bytes: u64,
    pub produced_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Read model of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSummary>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionReport {
    pub run: u64,
    pub output_size_bytes: u64,
    pub elapsed_ms: u64,
}

/// How a conversion request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The run finished and its output is now the session output.
    Completed(ConversionReport),
    /// Another run was already in flight; nothing happened.
    AlreadyRunning,
    /// The session was reset or disposed while the run was in flight; its
    /// result was discarded.
    Abandoned { run: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&SessionState::OutputReady).unwrap();
        assert_eq!(json, "\"output_ready\"");
        assert_eq!(SessionState::EngineLoading.as_str(), "engine_loading");
    }

    #[test]
    fn test_artifact_is_mp4() {
        let artifact = OutputArtifact::new(Bytes::from_static(b"ftyp"), 10);
        assert_eq!(artifact.mime_type(), "video/mp4");
        assert_eq!(artifact.size_bytes(), 4);
        assert_eq!(artifact.summary().elapsed_ms, 10);
    }
}
