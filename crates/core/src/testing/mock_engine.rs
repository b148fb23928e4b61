//! Mock transcoding engine for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify, RwLock};

use crate::engine::{validate_entry_name, EngineError, EngineProgress, TranscodeEngine};

/// Output bytes produced by default.
const DEFAULT_OUTPUT: &[u8] = b"\x00\x00\x00\x18ftypmp42mock mp4 payload";

/// A recorded engine call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Initialize,
    WriteInput { name: String, size_bytes: usize },
    Execute { args: Vec<String> },
    ReadOutput { name: String },
    Remove { name: String },
    Dispose,
}

/// Mock implementation of the TranscodeEngine trait.
///
/// Provides controllable behavior for testing:
/// - Record every call for assertions
/// - Fail initialization or the next run
/// - Script the progress ratios a run reports
/// - Hold a run in flight until the test releases it
#[derive(Debug)]
pub struct MockEngine {
    loaded: Arc<RwLock<bool>>,
    /// Scratch filesystem contents by entry name.
    files: Arc<RwLock<HashMap<String, Bytes>>>,
    calls: Arc<RwLock<Vec<EngineCall>>>,
    /// If set, `initialize` fails with this error.
    init_error: Arc<RwLock<Option<EngineError>>>,
    /// If set, the next `execute` fails with this error after reporting progress.
    next_execute_error: Arc<RwLock<Option<EngineError>>>,
    progress_script: Arc<RwLock<Vec<f64>>>,
    /// Bytes written to the output entry. `None` means no output is produced.
    output: Arc<RwLock<Option<Bytes>>>,
    /// Delay between scripted progress reports.
    step_delay: Arc<RwLock<Duration>>,
    hold: Arc<RwLock<bool>>,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a new mock engine that succeeds and reports 10%, 50%, 100%.
    pub fn new() -> Self {
        Self {
            loaded: Arc::new(RwLock::new(false)),
            files: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            init_error: Arc::new(RwLock::new(None)),
            next_execute_error: Arc::new(RwLock::new(None)),
            progress_script: Arc::new(RwLock::new(vec![0.1, 0.5, 1.0])),
            output: Arc::new(RwLock::new(Some(Bytes::from_static(DEFAULT_OUTPUT)))),
            step_delay: Arc::new(RwLock::new(Duration::ZERO)),
            hold: Arc::new(RwLock::new(false)),
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    /// Bytes the default output consists of.
    pub fn default_output() -> Bytes {
        Bytes::from_static(DEFAULT_OUTPUT)
    }

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<EngineCall> {
        self.calls.read().await.clone()
    }

    /// Argument lists of every `execute` call.
    pub async fn recorded_executions(&self) -> Vec<Vec<String>> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                EngineCall::Execute { args } => Some(args.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn execution_count(&self) -> usize {
        self.recorded_executions().await.len()
    }

    /// Names currently held in the scratch filesystem.
    pub async fn stored_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Make `initialize` fail with the given error.
    pub async fn set_init_error(&self, error: EngineError) {
        *self.init_error.write().await = Some(error);
    }

    /// Configure the next `execute` to fail with the given error.
    pub async fn set_next_execute_error(&self, error: EngineError) {
        *self.next_execute_error.write().await = Some(error);
    }

    pub async fn set_progress_script(&self, ratios: Vec<f64>) {
        *self.progress_script.write().await = ratios;
    }

    /// Set the bytes a run produces, or `None` to produce nothing.
    pub async fn set_output(&self, output: Option<Bytes>) {
        *self.output.write().await = output;
    }

    pub async fn set_step_delay(&self, delay: Duration) {
        *self.step_delay.write().await = delay;
    }

    /// Hold every run after it starts until [`release_execution`](Self::release_execution).
    pub async fn set_hold(&self, hold: bool) {
        *self.hold.write().await = hold;
    }

    /// Let one held run continue.
    pub fn release_execution(&self) {
        self.release.notify_one();
    }

    /// Wait until a run has entered `execute`.
    pub async fn wait_for_execution_start(&self) {
        self.started.notified().await;
    }

    async fn record(&self, call: EngineCall) {
        self.calls.write().await.push(call);
    }

    async fn ensure_loaded(&self) -> Result<(), EngineError> {
        if *self.loaded.read().await {
            Ok(())
        } else {
            Err(EngineError::NotLoaded)
        }
    }
}

#[async_trait]
impl TranscodeEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        self.record(EngineCall::Initialize).await;

        if let Some(err) = self.init_error.write().await.take() {
            return Err(err);
        }

        *self.loaded.write().await = true;
        Ok(())
    }

    async fn is_loaded(&self) -> bool {
        *self.loaded.read().await
    }

    async fn write_input(&self, name: &str, data: Bytes) -> Result<(), EngineError> {
        self.record(EngineCall::WriteInput {
            name: name.to_string(),
            size_bytes: data.len(),
        })
        .await;
        self.ensure_loaded().await?;
        validate_entry_name(name)?;

        self.files.write().await.insert(name.to_string(), data);
        Ok(())
    }

    async fn execute(
        &self,
        args: &[String],
        progress_tx: mpsc::Sender<EngineProgress>,
    ) -> Result<(), EngineError> {
        self.record(EngineCall::Execute {
            args: args.to_vec(),
        })
        .await;
        self.ensure_loaded().await?;

        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .ok_or_else(|| EngineError::transcode_failed("no input given", None))?;
        if !self.files.read().await.contains_key(input) {
            return Err(EngineError::transcode_failed(
                format!("{}: No such file or directory", input),
                None,
            ));
        }

        self.started.notify_one();
        if *self.hold.read().await {
            self.release.notified().await;
        }

        let script = self.progress_script.read().await.clone();
        let delay = *self.step_delay.read().await;
        for ratio in script {
            let _ = progress_tx.try_send(EngineProgress::ratio(ratio));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        if let Some(err) = self.next_execute_error.write().await.take() {
            return Err(err);
        }

        if let (Some(output), Some(name)) = (self.output.read().await.clone(), args.last()) {
            self.files.write().await.insert(name.clone(), output);
        }
        Ok(())
    }

    async fn read_output(&self, name: &str) -> Result<Bytes, EngineError> {
        self.record(EngineCall::ReadOutput {
            name: name.to_string(),
        })
        .await;
        self.ensure_loaded().await?;

        self.files
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::OutputMissing {
                name: name.to_string(),
            })
    }

    async fn remove(&self, name: &str) {
        self.record(EngineCall::Remove {
            name: name.to_string(),
        })
        .await;
        self.files.write().await.remove(name);
    }

    async fn dispose(&self) {
        self.record(EngineCall::Dispose).await;
        self.files.write().await.clear();
        *self.loaded.write().await = false;
    }
}
