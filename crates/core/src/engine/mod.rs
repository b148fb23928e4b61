//! Transcoding engine module.
//!
//! The engine is the external collaborator that does the actual decode/encode
//! work. This crate never implements codecs; it only drives an engine through
//! the [`TranscodeEngine`] trait:
//!
//! - `initialize` loads the engine core and creates a scratch filesystem scoped
//!   to the engine instance
//! - `write_input` / `read_output` / `remove` move named blobs in and out
//! - `execute` runs a command line and streams progress ratios over a channel
//!
//! # Example
//!
//! ```ignore
//! use mp4forge_core::engine::{ConversionParameters, EngineConfig, FfmpegEngine, TranscodeEngine};
//!
//! let engine = FfmpegEngine::new(EngineConfig::default());
//! engine.initialize().await?;
//!
//! let params = ConversionParameters::default();
//! engine.write_input(params.input_name, bytes).await?;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! engine.execute(&params.to_args(), tx).await?;
//! let mp4 = engine.read_output(params.output_name).await?;
//! ```

mod config;
mod error;
mod ffmpeg;
mod params;
mod traits;

pub use config::EngineConfig;
pub use error::EngineError;
pub use ffmpeg::{FfmpegEngine, ProgressParser};
pub use params::{ConversionParameters, OUTPUT_MIME_TYPE};
pub use traits::{validate_entry_name, EngineProgress, TranscodeEngine};
