//! Conversion session.
//!
//! A [`ConversionSession`] owns one user's flow through the converter:
//!
//! ```text
//! EngineLoading ──load ok──► Idle ──accept──► InputReady ──start──► Converting
//!       │                     ▲                  ▲   ▲                  │
//!       └─load failed─► Failed│                  │   └──── failure ─────┤
//!                             └───── reset ──────┴── OutputReady ◄─ ok ─┘
//! ```
//!
//! The engine is injected and stays owned by the caller. Progress is published
//! on a `watch` channel tagged with the run it belongs to.

mod error;
mod manager;
mod types;

pub use error::{
    SessionError, CONVERSION_FAILED_MESSAGE, ENGINE_LOAD_MESSAGE, INVALID_FILE_MESSAGE,
};
pub use manager::{ConversionHandle, ConversionSession, StartOutcome};
pub use types::{
    ConversionOutcome, ConversionReport, OutputArtifact, OutputSummary, SessionSnapshot,
    SessionState,
};
