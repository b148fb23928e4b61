//! Process-backed engine implementation driving an `ffmpeg` executable.

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::error::EngineError;
use super::traits::{validate_entry_name, EngineProgress, TranscodeEngine};

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap());

static OUT_TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"out_time_(?:ms|us)=(\d+)").unwrap());

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap());

/// Turns engine diagnostic lines into progress ratios.
///
/// The first `Duration:` header fixes the total; later `out_time_ms=` (from
/// `-progress`) or `time=` (from stats) lines give the position.
#[derive(Debug, Default)]
pub struct ProgressParser {
    duration_secs: Option<f64>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total input duration, once the header has been seen.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    /// Feeds one line. Returns a progress report when the line carries a position
    /// and the total duration is known.
    pub fn feed(&mut self, line: &str) -> Option<EngineProgress> {
        if self.duration_secs.is_none() {
            if let Some(caps) = DURATION_RE.captures(line) {
                let secs = clock_secs(&caps[1], &caps[2], &caps[3])?;
                if secs > 0.0 {
                    self.duration_secs = Some(secs);
                }
                return None;
            }
        }

        let time_secs = if let Some(caps) = OUT_TIME_RE.captures(line) {
            // Microseconds despite the name
            caps[1].parse::<f64>().ok()? / 1_000_000.0
        } else if let Some(caps) = TIME_RE.captures(line) {
            clock_secs(&caps[1], &caps[2], &caps[3])?
        } else {
            return None;
        };

        let duration = self.duration_secs?;
        Some(EngineProgress {
            ratio: (time_secs / duration).clamp(0.0, 1.0),
            time_secs: Some(time_secs),
        })
    }
}

fn clock_secs(hours: &str, minutes: &str, seconds: &str) -> Option<f64> {
    let h = hours.parse::<f64>().ok()?;
    let m = minutes.parse::<f64>().ok()?;
    let s = seconds.parse::<f64>().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

/// FFmpeg-based engine implementation.
///
/// The scratch filesystem is a private temporary directory created by
/// `initialize` and removed by `dispose`. Commands run with it as their
/// working directory, so logical names such as `input.mp4` resolve inside it.
pub struct FfmpegEngine {
    config: EngineConfig,
    scratch: RwLock<Option<TempDir>>,
}

impl FfmpegEngine {
    /// Creates a new engine with the given configuration. Nothing is loaded yet.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            scratch: RwLock::new(None),
        }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Non-interactive defaults placed ahead of every caller command line.
    fn default_args(&self) -> Vec<String> {
        vec![
            "-nostdin".to_string(),
            "-y".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-nostats".to_string(),
        ]
    }

    async fn scratch_path(&self) -> Result<PathBuf, EngineError> {
        let scratch = self.scratch.read().await;
        scratch
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or(EngineError::NotLoaded)
    }

    async fn entry_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        validate_entry_name(name)?;
        Ok(self.scratch_path().await?.join(name))
    }

    fn create_scratch(&self) -> Result<TempDir, EngineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mp4forge-");
        let dir = match &self.config.scratch_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    fn spawn_error(&self, e: std::io::Error) -> EngineError {
        if e.kind() == std::io::ErrorKind::NotFound {
            EngineError::CoreNotFound {
                path: self.config.core_path.clone(),
            }
        } else {
            EngineError::Io(e)
        }
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        if self.scratch.read().await.is_some() {
            return Ok(());
        }

        let output = Command::new(&self.config.core_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(EngineError::load_failed(format!(
                "{} -version exited with code: {:?}",
                self.config.core_path.display(),
                output.status.code()
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        let version = version.lines().next().unwrap_or("unknown version");

        let mut scratch = self.scratch.write().await;
        if scratch.is_none() {
            let dir = self.create_scratch()?;
            debug!("Engine scratch filesystem at {:?}", dir.path());
            *scratch = Some(dir);
        }

        info!("Engine loaded: {}", version);
        Ok(())
    }

    async fn is_loaded(&self) -> bool {
        self.scratch.read().await.is_some()
    }

    async fn write_input(&self, name: &str, data: Bytes) -> Result<(), EngineError> {
        let path = self.entry_path(name).await?;
        debug!("Writing {} bytes to engine entry {}", data.len(), name);
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn execute(
        &self,
        args: &[String],
        progress_tx: mpsc::Sender<EngineProgress>,
    ) -> Result<(), EngineError> {
        let dir = self.scratch_path().await?;

        let mut full_args = self.default_args();
        full_args.extend(args.iter().cloned());
        debug!("Running engine: {:?}", full_args);

        let mut child = Command::new(&self.config.core_path)
            .args(&full_args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stderr = child.stderr.take().ok_or_else(|| {
            EngineError::transcode_failed("engine diagnostic stream unavailable", None)
        })?;
        let mut reader = BufReader::new(stderr).lines();

        let mut parser = ProgressParser::new();
        let mut error_output = String::new();
        let mut last_ratio = 0.0;

        while let Ok(Some(line)) = reader.next_line().await {
            if line.contains("Error") || line.contains("error") {
                error_output.push_str(&line);
                error_output.push('\n');
            }

            if let Some(progress) = parser.feed(&line) {
                if progress.ratio > last_ratio {
                    last_ratio = progress.ratio;
                    // Non-blocking send
                    let _ = progress_tx.try_send(progress);
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(EngineError::transcode_failed(
                format!("engine exited with code: {:?}", status.code()),
                if error_output.is_empty() {
                    None
                } else {
                    Some(error_output)
                },
            ));
        }

        if last_ratio < 1.0 {
            let _ = progress_tx.try_send(EngineProgress {
                ratio: 1.0,
                time_secs: parser.duration_secs(),
            });
        }

        Ok(())
    }

    async fn read_output(&self, name: &str) -> Result<Bytes, EngineError> {
        let path = self.entry_path(name).await?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::OutputMissing {
                name: name.to_string(),
            }),
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    async fn remove(&self, name: &str) {
        let path = match self.entry_path(name).await {
            Ok(path) => path,
            Err(e) => {
                debug!("Skipping removal of {}: {}", name, e);
                return;
            }
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed engine entry {}", name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove engine entry {}: {}", name, e),
        }
    }

    async fn dispose(&self) {
        if let Some(dir) = self.scratch.write().await.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove engine scratch {:?}: {}", path, e);
            }
            info!("Engine disposed");
        }
    }
}
