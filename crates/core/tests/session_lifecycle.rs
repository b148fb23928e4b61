//! Conversion session lifecycle integration tests.
//!
//! These tests drive a session against the mock engine:
//! - Engine load success and terminal failure
//! - Input acceptance, rejection and replacement
//! - Conversion runs, progress, duplicate starts and failures
//! - Download, reset and dispose

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use mp4forge_core::{
    engine::{ConversionParameters, EngineError},
    progress::{ProgressConfig, ProgressSnapshot},
    session::{
        ConversionOutcome, ConversionSession, SessionError, SessionState, StartOutcome,
        CONVERSION_FAILED_MESSAGE, ENGINE_LOAD_MESSAGE,
    },
    testing::{fixtures, MockEngine},
    TranscodeEngine,
};

/// Test helper holding a session and the engine behind it.
struct TestHarness {
    session: Arc<ConversionSession<MockEngine>>,
    engine: Arc<MockEngine>,
}

impl TestHarness {
    /// A session whose engine has not been loaded yet.
    fn unloaded() -> Self {
        let engine = Arc::new(MockEngine::new());
        let session = Arc::new(ConversionSession::new(
            Arc::clone(&engine),
            ProgressConfig::default(),
        ));
        Self { session, engine }
    }

    async fn new() -> Self {
        let harness = Self::unloaded();
        harness
            .session
            .load_engine()
            .await
            .expect("mock engine should load");
        harness
    }

    async fn with_input() -> Self {
        let harness = Self::new().await;
        harness
            .session
            .accept_input(fixtures::webm_input("clip.webm"))
            .await
            .expect("webm input should be accepted");
        harness
    }

    /// Starts a run that stays inside the engine until released.
    async fn start_held(&self) -> mp4forge_core::session::ConversionHandle {
        self.engine.set_hold(true).await;
        let outcome = self.session.start_conversion().await.unwrap();
        let StartOutcome::Started(handle) = outcome else {
            panic!("expected a new run to start");
        };
        tokio::time::timeout(Duration::from_secs(5), self.engine.wait_for_execution_start())
            .await
            .expect("run should reach the engine");
        handle
    }
}

// ============================================================================
// Engine load
// ============================================================================

#[tokio::test]
async fn test_engine_load_moves_to_idle() {
    let harness = TestHarness::unloaded();
    assert_eq!(harness.session.state().await, SessionState::EngineLoading);

    harness.session.load_engine().await.unwrap();

    assert_eq!(harness.session.state().await, SessionState::Idle);
    assert!(harness.session.snapshot().await.error.is_none());
}

#[tokio::test]
async fn test_operations_wait_for_engine() {
    let harness = TestHarness::unloaded();

    let result = harness
        .session
        .accept_input(fixtures::webm_input("clip.webm"))
        .await;
    assert!(matches!(result, Err(SessionError::NotReady { .. })));

    let result = harness.session.convert().await;
    assert!(matches!(result, Err(SessionError::NotReady { .. })));
    assert_eq!(harness.engine.execution_count().await, 0);
}

#[tokio::test]
async fn test_engine_load_failure_is_terminal() {
    let harness = TestHarness::unloaded();
    harness
        .engine
        .set_init_error(EngineError::load_failed("core missing"))
        .await;

    let result = harness.session.load_engine().await;
    assert!(matches!(result, Err(SessionError::EngineLoad { .. })));
    assert_eq!(harness.session.state().await, SessionState::Failed);
    assert_eq!(
        harness.session.snapshot().await.error.as_deref(),
        Some(ENGINE_LOAD_MESSAGE)
    );

    // The mock would succeed now, but the session does not retry.
    let result = harness.session.load_engine().await;
    assert!(matches!(result, Err(SessionError::EngineLoad { .. })));

    let result = harness
        .session
        .accept_input(fixtures::webm_input("clip.webm"))
        .await;
    assert!(matches!(result, Err(SessionError::EngineLoad { .. })));
    assert!(matches!(
        harness.session.reset().await,
        Err(SessionError::EngineLoad { .. })
    ));
    assert_eq!(harness.session.state().await, SessionState::Failed);
}

// ============================================================================
// Input
// ============================================================================

#[tokio::test]
async fn test_accept_video_input() {
    let harness = TestHarness::new().await;

    let (summary, preview) = harness
        .session
        .accept_input(fixtures::webm_input("clip.webm"))
        .await
        .unwrap();

    assert_eq!(summary.name, "clip.webm");
    assert_eq!(summary.mime_type, "video/webm");
    assert_eq!(summary.size_bytes, fixtures::WEBM_BYTES.len() as u64);

    let blob = harness.session.resolve_url(preview.id()).await.unwrap();
    assert_eq!(blob.mime_type, "video/webm");
    assert_eq!(blob.data, Bytes::from_static(fixtures::WEBM_BYTES));

    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::InputReady);
    assert_eq!(snapshot.preview_url, Some(preview.to_string()));
    assert!(snapshot.output.is_none());
}

#[tokio::test]
async fn test_reject_non_video_input() {
    let harness = TestHarness::new().await;

    let result = harness
        .session
        .accept_input(fixtures::text_input("notes.txt"))
        .await;

    assert!(matches!(result, Err(SessionError::InvalidFile { .. })));
    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.input.is_none());
    assert!(snapshot.preview_url.is_none());
}

#[tokio::test]
async fn test_rejected_input_keeps_previous_one() {
    let harness = TestHarness::with_input().await;

    let result = harness
        .session
        .accept_input(fixtures::text_input("notes.txt"))
        .await;

    assert!(result.is_err());
    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::InputReady);
    assert_eq!(snapshot.input.unwrap().name, "clip.webm");
}

#[tokio::test]
async fn test_replacing_input_revokes_preview() {
    let harness = TestHarness::new().await;

    let (_, first) = harness
        .session
        .accept_input(fixtures::webm_input("first.webm"))
        .await
        .unwrap();
    let (_, second) = harness
        .session
        .accept_input(fixtures::video_input("second.mov", "quicktime", b"mov"))
        .await
        .unwrap();

    assert_ne!(first, second);
    assert!(harness.session.resolve_url(first.id()).await.is_none());
    assert!(harness.session.resolve_url(second.id()).await.is_some());
}

#[tokio::test]
async fn test_new_input_discards_output() {
    let harness = TestHarness::with_input().await;
    harness.session.convert().await.unwrap();
    assert_eq!(harness.session.state().await, SessionState::OutputReady);

    harness
        .session
        .accept_input(fixtures::video_input("other.avi", "x-msvideo", b"avi"))
        .await
        .unwrap();

    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::InputReady);
    assert!(snapshot.output.is_none());
    assert_eq!(snapshot.progress, 0);
}

// ============================================================================
// Conversion
// ============================================================================

#[tokio::test]
async fn test_convert_produces_mp4() {
    let harness = TestHarness::with_input().await;

    let outcome = harness.session.convert().await.unwrap();

    let ConversionOutcome::Completed(report) = outcome else {
        panic!("expected the run to complete");
    };
    assert_eq!(report.run, 1);
    assert_eq!(
        report.output_size_bytes,
        MockEngine::default_output().len() as u64
    );

    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::OutputReady);
    assert_eq!(snapshot.progress, 100);
    assert!(snapshot.error.is_none());
    let output = snapshot.output.unwrap();
    assert_eq!(output.mime_type, "video/mp4");
}

#[tokio::test]
async fn test_engine_receives_fixed_arguments() {
    let harness = TestHarness::with_input().await;
    harness.session.convert().await.unwrap();

    let executions = harness.engine.recorded_executions().await;
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0], ConversionParameters::default().to_args());
    assert_eq!(
        executions[0].join(" "),
        "-i input.mp4 -c:v h264 -preset fast -b:v 4000k -vf fps=30 -c:a aac \
         -strict experimental -b:a 128k -movflags +faststart output.mp4"
    );
}

#[tokio::test]
async fn test_scratch_entries_removed_after_run() {
    let harness = TestHarness::with_input().await;
    harness.session.convert().await.unwrap();
    assert!(harness.engine.stored_entries().await.is_empty());

    harness
        .engine
        .set_next_execute_error(EngineError::transcode_failed("exit status 1", None))
        .await;
    let _ = harness.session.convert().await;
    assert!(harness.engine.stored_entries().await.is_empty());
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let harness = TestHarness::with_input().await;
    harness.engine.set_step_delay(Duration::from_millis(20)).await;
    harness
        .engine
        .set_progress_script(vec![0.1, 0.5, 0.3, 1.0])
        .await;

    let mut progress = harness.session.subscribe_progress().await.unwrap();
    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow_and_update();
            seen.push(snapshot.percent);
            if snapshot.percent == 100 {
                break;
            }
        }
        seen
    });

    harness.session.convert().await.unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(5), collector)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert!(!seen.contains(&30));
}

#[tokio::test]
async fn test_progress_follows_engine_ratios() {
    let harness = TestHarness::with_input().await;
    harness.engine.set_step_delay(Duration::from_millis(50)).await;

    let mut progress = harness.session.subscribe_progress().await.unwrap();
    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow_and_update();
            seen.push(snapshot.percent);
            if snapshot.percent == 100 {
                break;
            }
        }
        seen
    });

    harness.session.convert().await.unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(5), collector)
        .await
        .unwrap()
        .unwrap();
    let ten = seen.iter().position(|p| *p == 10).expect("10% reported");
    let fifty = seen.iter().position(|p| *p == 50).expect("50% reported");
    assert!(ten < fifty, "{seen:?}");
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn test_rerun_starts_progress_at_zero() {
    let harness = TestHarness::with_input().await;
    harness.session.convert().await.unwrap();
    assert_eq!(harness.session.snapshot().await.progress, 100);

    let handle = harness.start_held().await;

    assert_eq!(harness.session.snapshot().await.progress, 0);
    let progress = harness.session.subscribe_progress().await.unwrap();
    assert_eq!(
        *progress.borrow(),
        ProgressSnapshot { run: 2, percent: 0 }
    );

    harness.engine.release_execution();
    handle.wait().await.unwrap();
    assert_eq!(harness.session.snapshot().await.progress, 100);
}

#[tokio::test]
async fn test_duplicate_start_is_noop() {
    let harness = TestHarness::with_input().await;
    let handle = harness.start_held().await;
    assert_eq!(harness.session.state().await, SessionState::Converting);

    let second = harness.session.start_conversion().await.unwrap();
    assert!(matches!(second, StartOutcome::AlreadyRunning));
    let third = harness.session.convert().await.unwrap();
    assert_eq!(third, ConversionOutcome::AlreadyRunning);

    harness.engine.release_execution();
    let outcome = handle.wait().await.unwrap();
    assert!(matches!(outcome, ConversionOutcome::Completed(_)));
    assert_eq!(harness.engine.execution_count().await, 1);
}

#[tokio::test]
async fn test_input_locked_while_converting() {
    let harness = TestHarness::with_input().await;
    let handle = harness.start_held().await;

    let result = harness
        .session
        .accept_input(fixtures::webm_input("other.webm"))
        .await;
    assert!(matches!(result, Err(SessionError::Busy)));

    let result = harness
        .session
        .accept_input(fixtures::text_input("notes.txt"))
        .await;
    assert!(matches!(result, Err(SessionError::Busy)));

    harness.engine.release_execution();
    handle.wait().await.unwrap();
    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.input.unwrap().name, "clip.webm");
}

#[tokio::test]
async fn test_failed_run_returns_to_input_ready() {
    let harness = TestHarness::with_input().await;
    harness
        .engine
        .set_next_execute_error(EngineError::transcode_failed(
            "Invalid data found when processing input",
            Some("input.mp4: Invalid data found when processing input".to_string()),
        ))
        .await;

    let result = harness.session.convert().await;

    assert!(matches!(result, Err(SessionError::Transcode { .. })));
    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::InputReady);
    assert_eq!(snapshot.error.as_deref(), Some(CONVERSION_FAILED_MESSAGE));
    assert!(snapshot.output.is_none());
    assert!(snapshot.input.is_some());

    // The input is kept, so a retry works and clears the error.
    harness.session.convert().await.unwrap();
    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::OutputReady);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn test_engine_core_lost_mid_run_is_recoverable() {
    let harness = TestHarness::with_input().await;
    harness
        .engine
        .set_next_execute_error(EngineError::CoreNotFound {
            path: "ffmpeg".into(),
        })
        .await;

    let err = harness.session.convert().await.unwrap_err();

    assert!(matches!(err, SessionError::Transcode { .. }), "{err:?}");
    assert!(err.is_recoverable());
    assert_eq!(err.user_message(), CONVERSION_FAILED_MESSAGE);
    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::InputReady);
    assert_eq!(snapshot.error.as_deref(), Some(CONVERSION_FAILED_MESSAGE));

    harness.session.convert().await.unwrap();
    assert_eq!(harness.session.state().await, SessionState::OutputReady);
}

#[tokio::test]
async fn test_missing_output_is_a_failure() {
    let harness = TestHarness::with_input().await;
    harness.engine.set_output(None).await;

    let result = harness.session.convert().await;

    assert!(matches!(result, Err(SessionError::OutputMissing { .. })));
    assert_eq!(harness.session.state().await, SessionState::InputReady);
}

#[tokio::test]
async fn test_empty_output_is_a_failure() {
    let harness = TestHarness::with_input().await;
    harness.engine.set_output(Some(Bytes::new())).await;

    let result = harness.session.convert().await;

    assert!(matches!(result, Err(SessionError::OutputMissing { .. })));
    assert!(harness.session.snapshot().await.output.is_none());
}

#[tokio::test]
async fn test_rerun_replaces_output() {
    let harness = TestHarness::with_input().await;
    harness.session.convert().await.unwrap();

    harness
        .engine
        .set_output(Some(Bytes::from_static(b"second mp4")))
        .await;
    let outcome = harness.session.convert().await.unwrap();

    let ConversionOutcome::Completed(report) = outcome else {
        panic!("expected the rerun to complete");
    };
    assert_eq!(report.run, 2);
    let download = harness.session.download().await.unwrap();
    assert_eq!(download.data, Bytes::from_static(b"second mp4"));
}

#[tokio::test]
async fn test_convert_without_input() {
    let harness = TestHarness::new().await;

    let result = harness.session.convert().await;

    assert!(matches!(result, Err(SessionError::NotReady { .. })));
    assert_eq!(harness.session.state().await, SessionState::Idle);
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn test_download_output() {
    let harness = TestHarness::with_input().await;
    harness.session.convert().await.unwrap();

    let download = harness.session.download().await.unwrap();

    assert!(download.file_name.starts_with("converted-"));
    assert!(download.file_name.ends_with(".mp4"));
    assert_eq!(download.mime_type, "video/mp4");
    assert_eq!(download.data, MockEngine::default_output());

    // Only the preview URL remains live.
    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::OutputReady);
    assert!(snapshot.preview_url.is_some());
}

#[tokio::test]
async fn test_download_requires_output() {
    let harness = TestHarness::with_input().await;

    let result = harness.session.download().await;

    assert!(matches!(result, Err(SessionError::NotReady { .. })));
}

// ============================================================================
// Reset and dispose
// ============================================================================

#[tokio::test]
async fn test_reset_clears_everything() {
    let harness = TestHarness::with_input().await;
    let preview = harness.session.snapshot().await.preview_url.unwrap();
    harness.session.convert().await.unwrap();

    harness.session.reset().await.unwrap();

    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.input.is_none());
    assert!(snapshot.output.is_none());
    assert!(snapshot.preview_url.is_none());
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.progress, 0);

    let id = preview.rsplit('/').next().unwrap();
    assert!(harness.session.resolve_url(id).await.is_none());
}

#[tokio::test]
async fn test_reset_abandons_running_conversion() {
    let harness = TestHarness::with_input().await;
    let handle = harness.start_held().await;

    harness.session.reset().await.unwrap();
    assert_eq!(harness.session.state().await, SessionState::Idle);

    harness.engine.release_execution();
    let outcome = handle.wait().await.unwrap();
    assert_eq!(outcome, ConversionOutcome::Abandoned { run: 1 });

    let snapshot = harness.session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.output.is_none());
    assert_eq!(snapshot.progress, 0);

    // The session is usable again once the abandoned run has drained.
    harness.engine.set_hold(false).await;
    harness
        .session
        .accept_input(fixtures::webm_input("next.webm"))
        .await
        .unwrap();
    let outcome = harness.session.convert().await.unwrap();
    assert!(matches!(outcome, ConversionOutcome::Completed(_)));
}

#[tokio::test]
async fn test_dispose_releases_session() {
    let harness = TestHarness::with_input().await;
    let preview = harness.session.snapshot().await.preview_url.unwrap();
    let mut progress = harness.session.subscribe_progress().await.unwrap();

    harness.session.dispose().await;

    let id = preview.rsplit('/').next().unwrap();
    assert!(harness.session.resolve_url(id).await.is_none());
    assert!(harness.session.subscribe_progress().await.is_none());
    assert!(progress.changed().await.is_err());

    let result = harness
        .session
        .accept_input(fixtures::webm_input("clip.webm"))
        .await;
    assert!(matches!(result, Err(SessionError::Disposed)));
    assert!(matches!(
        harness.session.convert().await,
        Err(SessionError::Disposed)
    ));

    // Disposing twice is harmless, and the engine stays with its owner.
    harness.session.dispose().await;
    assert!(harness.engine.is_loaded().await);
}
