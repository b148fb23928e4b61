pub mod config;
pub mod delivery;
pub mod engine;
pub mod input;
pub mod metrics;
pub mod progress;
pub mod session;
pub mod testing;
pub mod transient;

pub use config::{
    load_config, load_config_from_str, load_default_config, validate_config, Config, ConfigError,
    SanitizedConfig,
};
pub use delivery::Download;
pub use engine::{
    ConversionParameters, EngineConfig, EngineError, EngineProgress, FfmpegEngine,
    TranscodeEngine,
};
pub use input::{InputFile, InputSummary};
pub use progress::{ProgressConfig, ProgressSnapshot};
pub use session::{
    ConversionOutcome, ConversionSession, SessionError, SessionSnapshot, SessionState,
    StartOutcome,
};
pub use transient::TransientUrl;
