//! Testing utilities.
//!
//! [`MockEngine`] stands in for a real transcoding engine so the session can be
//! exercised end to end without an engine core installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use mp4forge_core::testing::{fixtures, MockEngine};
//!
//! let engine = Arc::new(MockEngine::new());
//! engine.set_progress_script(vec![0.1, 0.5, 1.0]).await;
//!
//! let session = Arc::new(ConversionSession::new(engine.clone(), ProgressConfig::default()));
//! session.load_engine().await?;
//! session.accept_input(fixtures::webm_input("clip.webm")).await?;
//! session.convert().await?;
//!
//! assert_eq!(engine.execution_count().await, 1);
//! ```

mod mock_engine;

pub use mock_engine::{EngineCall, MockEngine};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::input::InputFile;

    /// Bytes that look enough like a WebM header for logging and previews.
    pub const WEBM_BYTES: &[u8] = b"\x1a\x45\xdf\xa3fake webm payload";

    /// A `video/webm` input.
    pub fn webm_input(name: &str) -> InputFile {
        InputFile::new(name, "video/webm", WEBM_BYTES.to_vec())
    }

    /// A `video/*` input with the given subtype.
    pub fn video_input(name: &str, subtype: &str, data: &[u8]) -> InputFile {
        InputFile::new(name, format!("video/{}", subtype), data.to_vec())
    }

    /// A `text/plain` file, which the session must reject.
    pub fn text_input(name: &str) -> InputFile {
        InputFile::new(name, "text/plain", b"just some notes".to_vec())
    }
}
