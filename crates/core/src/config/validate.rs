use super::{types::Config, ConfigError};

/// Engine log levels that still print the `Duration:` header.
const PROGRESS_LOG_LEVELS: &[&str] = &["info", "verbose", "debug", "trace"];

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Engine core path is not empty
/// - Engine log level keeps the lines progress is parsed from
/// - Progress tick and channel capacity are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.engine.core_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.core_path cannot be empty".to_string(),
        ));
    }

    if !PROGRESS_LOG_LEVELS.contains(&config.engine.log_level.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "engine.log_level {:?} hides progress output, use one of {}",
            config.engine.log_level,
            PROGRESS_LOG_LEVELS.join(", ")
        )));
    }

    if config.progress.tick_ms == 0 {
        return Err(ConfigError::ValidationError(
            "progress.tick_ms cannot be 0".to_string(),
        ));
    }

    if config.progress.channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "progress.channel_capacity cannot be 0".to_string(),
        ));
    }

    Ok(())
}
