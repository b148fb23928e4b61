//! The conversion session state machine.

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::delivery::{self, Download};
use crate::engine::{ConversionParameters, EngineError, EngineProgress, TranscodeEngine};
use crate::input::{validate_input, InputFile, InputSummary};
use crate::metrics::{CONVERSIONS_TOTAL, CONVERSION_DURATION, ENGINE_LOADS, INPUTS_TOTAL};
use crate::progress::{ProgressConfig, ProgressReporter, ProgressSnapshot};
use crate::transient::{BlobEntry, TransientUrl, TransientUrls};

use super::error::{SessionError, CONVERSION_FAILED_MESSAGE, ENGINE_LOAD_MESSAGE};
use super::types::{
    ConversionOutcome, ConversionReport, OutputArtifact, SessionSnapshot, SessionState,
};

/// Mutable session data, guarded by one lock.
struct SessionInner {
    state: SessionState,
    input: Option<InputFile>,
    preview_url: Option<TransientUrl>,
    output: Option<OutputArtifact>,
    error: Option<String>,
    urls: TransientUrls,
    /// `None` once disposed.
    progress: Option<ProgressReporter>,
    /// Bumped by every run start, reset and dispose. A run whose number no
    /// longer matches has been abandoned.
    generation: u64,
    /// Engine work outstanding. Can outlive `Converting` after a reset.
    in_flight: bool,
    disposed: bool,
    load_error: Option<String>,
}

impl SessionInner {
    fn check_usable(&self) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        match self.state {
            SessionState::EngineLoading => Err(SessionError::not_ready("engine is still loading")),
            SessionState::Failed => Err(SessionError::EngineLoad {
                reason: self
                    .load_error
                    .clone()
                    .unwrap_or_else(|| "engine unavailable".to_string()),
            }),
            _ => Ok(()),
        }
    }

    fn release_input(&mut self) {
        if let Some(url) = self.preview_url.take() {
            self.urls.revoke(&url);
        }
        self.input = None;
    }

    fn clear_progress(&self) {
        if let Some(progress) = &self.progress {
            progress.clear(self.generation);
        }
    }
}

/// Work captured when a run starts.
struct PreparedRun {
    run: u64,
    input: Bytes,
}

/// A run started in the background by [`ConversionSession::start_conversion`].
pub struct ConversionHandle {
    run: u64,
    handle: JoinHandle<Result<ConversionOutcome, SessionError>>,
}

impl ConversionHandle {
    pub fn run(&self) -> u64 {
        self.run
    }

    /// Waits for the run to finish.
    pub async fn wait(self) -> Result<ConversionOutcome, SessionError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(SessionError::Transcode {
                reason: format!("conversion task failed: {}", e),
            }),
        }
    }
}

/// What [`ConversionSession::start_conversion`] did.
pub enum StartOutcome {
    Started(ConversionHandle),
    AlreadyRunning,
}

/// Sequences engine load, input, conversion, output and release.
///
/// The engine is injected and owned by the caller. The session guards its
/// state with an async lock that is never held across engine calls; a run is
/// claimed under the lock before any engine work is issued, so at most one run
/// is in flight.
pub struct ConversionSession<E: TranscodeEngine + ?Sized> {
    engine: Arc<E>,
    params: ConversionParameters,
    config: ProgressConfig,
    inner: RwLock<SessionInner>,
}

impl<E: TranscodeEngine + ?Sized + 'static> ConversionSession<E> {
    /// Creates a session in `EngineLoading`. Call [`load_engine`](Self::load_engine) next.
    pub fn new(engine: Arc<E>, config: ProgressConfig) -> Self {
        Self {
            engine,
            params: ConversionParameters::default(),
            config,
            inner: RwLock::new(SessionInner {
                state: SessionState::EngineLoading,
                input: None,
                preview_url: None,
                output: None,
                error: None,
                urls: TransientUrls::new(),
                progress: Some(ProgressReporter::new()),
                generation: 0,
                in_flight: false,
                disposed: false,
                load_error: None,
            }),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn parameters(&self) -> &ConversionParameters {
        &self.params
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    /// Loads the engine. `EngineLoading → Idle`, or `→ Failed` for good.
    pub async fn load_engine(&self) -> Result<(), SessionError> {
        {
            let inner = self.inner.read().await;
            if inner.disposed {
                return Err(SessionError::Disposed);
            }
            match inner.state {
                SessionState::EngineLoading => {}
                SessionState::Failed => return inner.check_usable(),
                _ => return Ok(()),
            }
        }

        info!("Loading {} engine", self.engine.name());
        let result = self.engine.initialize().await;

        let mut inner = self.inner.write().await;
        match result {
            Ok(()) => {
                ENGINE_LOADS.with_label_values(&["success"]).inc();
                if inner.state == SessionState::EngineLoading {
                    inner.state = SessionState::Idle;
                    info!("Engine ready, session idle");
                }
                Ok(())
            }
            Err(e) => {
                ENGINE_LOADS.with_label_values(&["failed"]).inc();
                error!("Error loading engine: {}", e);
                let reason = e.to_string();
                inner.state = SessionState::Failed;
                inner.error = Some(ENGINE_LOAD_MESSAGE.to_string());
                inner.load_error = Some(reason.clone());
                Err(SessionError::EngineLoad { reason })
            }
        }
    }

    /// Accepts a new input, replacing any previous one.
    ///
    /// The previous preview URL is revoked and any output is discarded, since
    /// it no longer corresponds to the input. Returns the new input's metadata
    /// and preview URL.
    pub async fn accept_input(
        &self,
        file: InputFile,
    ) -> Result<(InputSummary, TransientUrl), SessionError> {
        let mut inner = self.inner.write().await;
        inner.check_usable()?;
        if inner.state == SessionState::Converting {
            return Err(SessionError::Busy);
        }

        if let Err(e) = validate_input(&file) {
            INPUTS_TOTAL.with_label_values(&["rejected"]).inc();
            warn!("Rejected input {:?} ({})", file.name(), file.mime_type());
            return Err(e);
        }

        inner.release_input();
        inner.output = None;
        inner.error = None;
        inner.clear_progress();

        let preview = inner
            .urls
            .create(file.data().clone(), file.mime_type().to_string());
        let summary = file.summary();

        info!(
            "Accepted input {:?} ({}, {:.2} MB)",
            file.name(),
            file.mime_type(),
            file.size_mb()
        );
        INPUTS_TOTAL.with_label_values(&["accepted"]).inc();

        inner.preview_url = Some(preview.clone());
        inner.input = Some(file);
        inner.state = SessionState::InputReady;

        Ok((summary, preview))
    }

    /// Claims a run under the lock. `None` means a run is already in flight.
    async fn begin_run(&self) -> Result<Option<PreparedRun>, SessionError> {
        let mut inner = self.inner.write().await;
        inner.check_usable()?;

        if inner.state == SessionState::Converting {
            debug!("Conversion already running, ignoring request");
            return Ok(None);
        }

        let input = match (&inner.state, &inner.input) {
            (SessionState::InputReady | SessionState::OutputReady, Some(input)) => {
                input.data().clone()
            }
            _ => return Err(SessionError::not_ready("no input selected")),
        };

        if inner.in_flight {
            debug!("Abandoned run still draining, ignoring request");
            return Ok(None);
        }

        inner.output = None;
        inner.error = None;
        inner.generation += 1;
        inner.in_flight = true;
        inner.state = SessionState::Converting;

        let run = inner.generation;
        if let Some(progress) = &inner.progress {
            progress.begin_run(run);
        }

        info!("Starting conversion run {}", run);
        Ok(Some(PreparedRun { run, input }))
    }

    /// Runs write → execute → read against the engine.
    async fn engine_pass(
        &self,
        input: Bytes,
        progress_tx: mpsc::Sender<EngineProgress>,
    ) -> Result<Bytes, EngineError> {
        self.engine.write_input(self.params.input_name, input).await?;
        self.engine
            .execute(&self.params.to_args(), progress_tx)
            .await?;
        let output = self.engine.read_output(self.params.output_name).await?;
        if output.is_empty() {
            return Err(EngineError::OutputMissing {
                name: self.params.output_name.to_string(),
            });
        }
        Ok(output)
    }

    async fn execute_run(&self, prepared: PreparedRun) -> Result<ConversionOutcome, SessionError> {
        let PreparedRun { run, input } = prepared;
        let started = Instant::now();

        let (tx, mut rx) = mpsc::channel::<EngineProgress>(self.config.channel_capacity);
        let pump = async {
            while let Some(update) = rx.recv().await {
                if let Some(progress) = &self.inner.read().await.progress {
                    progress.record(run, update.ratio);
                }
            }
        };
        let (result, ()) = tokio::join!(self.engine_pass(input, tx), pump);

        self.engine.remove(self.params.input_name).await;
        self.engine.remove(self.params.output_name).await;

        let elapsed = started.elapsed();
        let mut inner = self.inner.write().await;
        inner.in_flight = false;

        if inner.disposed || inner.generation != run {
            CONVERSIONS_TOTAL.with_label_values(&["abandoned"]).inc();
            info!("Conversion run {} abandoned, discarding result", run);
            return Ok(ConversionOutcome::Abandoned { run });
        }

        match result {
            Ok(data) => {
                let report = ConversionReport {
                    run,
                    output_size_bytes: data.len() as u64,
                    elapsed_ms: elapsed.as_millis() as u64,
                };
                inner.output = Some(OutputArtifact::new(data, report.elapsed_ms));
                inner.state = SessionState::OutputReady;
                if let Some(progress) = &inner.progress {
                    progress.record(run, 1.0);
                }

                CONVERSIONS_TOTAL.with_label_values(&["success"]).inc();
                CONVERSION_DURATION
                    .with_label_values(&["success"])
                    .observe(elapsed.as_secs_f64());
                info!(
                    "Conversion run {} completed: {} bytes in {} ms",
                    run, report.output_size_bytes, report.elapsed_ms
                );
                Ok(ConversionOutcome::Completed(report))
            }
            Err(e) => {
                CONVERSIONS_TOTAL.with_label_values(&["failed"]).inc();
                CONVERSION_DURATION
                    .with_label_values(&["failed"])
                    .observe(elapsed.as_secs_f64());
                if let EngineError::TranscodeFailed {
                    stderr: Some(stderr),
                    ..
                } = &e
                {
                    debug!("Engine diagnostics for run {}:\n{}", run, stderr);
                }
                error!("Error during conversion run {}: {}", run, e);

                inner.state = SessionState::InputReady;
                inner.error = Some(CONVERSION_FAILED_MESSAGE.to_string());
                Err(SessionError::from_engine(e))
            }
        }
    }

    /// Converts the current input, returning when the run ends.
    ///
    /// A request while another run is in flight is a no-op that returns
    /// [`ConversionOutcome::AlreadyRunning`].
    pub async fn convert(&self) -> Result<ConversionOutcome, SessionError> {
        match self.begin_run().await? {
            Some(prepared) => self.execute_run(prepared).await,
            None => Ok(ConversionOutcome::AlreadyRunning),
        }
    }

    /// Claims a run and drives it on a background task.
    ///
    /// On return the session is already `Converting`, so a second call sees
    /// [`StartOutcome::AlreadyRunning`].
    pub async fn start_conversion(self: &Arc<Self>) -> Result<StartOutcome, SessionError> {
        let Some(prepared) = self.begin_run().await? else {
            return Ok(StartOutcome::AlreadyRunning);
        };

        let run = prepared.run;
        let session = Arc::clone(self);
        let handle = tokio::spawn(async move { session.execute_run(prepared).await });
        Ok(StartOutcome::Started(ConversionHandle { run, handle }))
    }

    /// Returns to `Idle`, releasing input, output, URLs, progress and error.
    ///
    /// During a run the run is abandoned: the engine keeps going, its result is
    /// discarded, and no new run starts until it returns.
    pub async fn reset(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.write().await;
        inner.check_usable()?;

        if inner.state == SessionState::Converting {
            warn!("Reset during conversion run {}, abandoning it", inner.generation);
        }

        inner.release_input();
        inner.output = None;
        inner.error = None;
        inner.generation += 1;
        inner.clear_progress();
        inner.state = SessionState::Idle;

        debug!("Session reset, {} transient URLs live", inner.urls.len());
        Ok(())
    }

    /// Hands over the output as a one-shot download.
    pub async fn download(&self) -> Result<Download, SessionError> {
        let mut inner = self.inner.write().await;
        inner.check_usable()?;

        let SessionInner { output, urls, .. } = &mut *inner;
        let artifact = output
            .as_ref()
            .ok_or_else(|| SessionError::not_ready("no converted output"))?;

        Ok(delivery::deliver(urls, artifact, Utc::now()))
    }

    /// Looks up a live transient URL by id, e.g. the input preview.
    pub async fn resolve_url(&self, id: &str) -> Option<BlobEntry> {
        self.inner.read().await.urls.resolve_id(id).cloned()
    }

    /// Subscribes to true progress. `None` once disposed.
    pub async fn subscribe_progress(&self) -> Option<watch::Receiver<ProgressSnapshot>> {
        self.inner
            .read()
            .await
            .progress
            .as_ref()
            .map(ProgressReporter::subscribe)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read().await;
        SessionSnapshot {
            state: inner.state,
            engine: self.engine.name().to_string(),
            input: inner.input.as_ref().map(InputFile::summary),
            preview_url: inner.preview_url.as_ref().map(|u| u.to_string()),
            output: inner.output.as_ref().map(OutputArtifact::summary),
            progress: inner
                .progress
                .as_ref()
                .map(|p| p.current().percent)
                .unwrap_or(0),
            error: inner.error.clone(),
        }
    }

    /// Releases every transient URL, drops input and output, and closes the
    /// progress channel. Later operations fail with `Disposed`.
    ///
    /// The engine belongs to the caller and is left loaded.
    pub async fn dispose(&self) {
        let mut inner = self.inner.write().await;
        if inner.disposed {
            return;
        }

        let revoked = inner.urls.revoke_all();
        inner.preview_url = None;
        inner.input = None;
        inner.output = None;
        inner.generation += 1;
        inner.progress = None;
        inner.disposed = true;

        info!("Session disposed, revoked {} transient URLs", revoked);
    }
}
