use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::engine::EngineConfig;
use crate::progress::ProgressConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the static control page.
    #[serde(default = "default_ui_dir")]
    pub ui_dir: PathBuf,
    /// Largest accepted upload, in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ui_dir: default_ui_dir(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8080
}

fn default_ui_dir() -> PathBuf {
    PathBuf::from("crates/server/static")
}

fn default_max_upload_mb() -> usize {
    2048
}

/// Sanitized config for API responses (local paths reduced to flags)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: SanitizedServerConfig,
    pub engine: SanitizedEngineConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub max_upload_mb: usize,
}

/// Engine settings without filesystem locations
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEngineConfig {
    pub core_path_configured: bool,
    pub custom_scratch_dir: bool,
    pub log_level: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: SanitizedServerConfig {
                host: config.server.host,
                port: config.server.port,
                max_upload_mb: config.server.max_upload_mb,
            },
            engine: SanitizedEngineConfig {
                core_path_configured: !config.engine.core_path.as_os_str().is_empty(),
                custom_scratch_dir: config.engine.scratch_dir.is_some(),
                log_level: config.engine.log_level.clone(),
            },
            progress: config.progress.clone(),
        }
    }
}
