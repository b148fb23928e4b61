//! Configuration for the engine module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the process-backed transcoding engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Location of the engine core executable.
    #[serde(default = "default_core_path")]
    pub core_path: PathBuf,

    /// Parent directory for the engine scratch filesystem.
    /// Defaults to the system temp directory.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Engine log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    /// Progress parsing needs at least `info`; config validation rejects lower levels.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_core_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            core_path: default_core_path(),
            scratch_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Creates a new config with a custom core path.
    pub fn with_core_path(core_path: PathBuf) -> Self {
        Self {
            core_path,
            ..Default::default()
        }
    }

    /// Sets the scratch parent directory.
    pub fn with_scratch_dir(mut self, scratch_dir: PathBuf) -> Self {
        self.scratch_dir = Some(scratch_dir);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.core_path, PathBuf::from("ffmpeg"));
        assert!(config.scratch_dir.is_none());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::with_core_path(PathBuf::from("/usr/local/bin/ffmpeg"))
            .with_scratch_dir(PathBuf::from("/tmp/test"));

        assert_eq!(config.core_path, PathBuf::from("/usr/local/bin/ffmpeg"));
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/tmp/test")));
    }
}
