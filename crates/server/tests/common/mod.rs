//! Common test utilities for API testing with a mock engine.
//!
//! This module provides a test fixture that creates an in-process server
//! with a [`MockEngine`] injected, so the whole control surface can be
//! exercised without an engine core installed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use mp4forge_core::{Config, ConversionSession, ProgressConfig, TranscodeEngine};
use mp4forge_server::api::WsBroadcaster;
use mp4forge_server::state::{AppState, Session};

/// Re-export mock engine and fixtures for test convenience
pub use mp4forge_core::testing::{fixtures, MockEngine};

const BOUNDARY: &str = "mp4forge-test-boundary";

/// Test fixture for API testing with a mock engine.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.upload("clip.webm", "video/webm", b"webm").await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock engine - script progress, outputs and failures
    pub engine: Arc<MockEngine>,
    /// The session behind the router
    pub session: Arc<Session>,
    /// Broadcaster the handlers publish to
    pub ws_broadcaster: WsBroadcaster,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Response from a test request, body kept as bytes
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestFixture {
    /// Create a fixture whose engine has loaded.
    pub async fn new() -> Self {
        let fixture = Self::unloaded();
        fixture
            .session
            .load_engine()
            .await
            .expect("mock engine should load");
        fixture
    }

    /// Create a fixture whose engine fails to load.
    pub async fn with_failed_engine() -> Self {
        let fixture = Self::unloaded();
        fixture
            .engine
            .set_init_error(mp4forge_core::EngineError::load_failed("core missing"))
            .await;
        let _ = fixture.session.load_engine().await;
        fixture
    }

    /// Create a fixture without loading the engine.
    pub fn unloaded() -> Self {
        let engine = Arc::new(MockEngine::new());
        let dyn_engine: Arc<dyn TranscodeEngine> = engine.clone();
        let session: Arc<Session> = Arc::new(ConversionSession::new(
            dyn_engine,
            ProgressConfig::default(),
        ));

        let mut config = Config::default();
        config.server.port = 0; // Not used for in-process testing
        config.server.max_upload_mb = 1;

        let ws_broadcaster = WsBroadcaster::default();
        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&session),
            ws_broadcaster.clone(),
        ));

        let router = mp4forge_server::api::create_router(state);

        Self {
            router,
            engine,
            session,
            ws_broadcaster,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path).await
    }

    /// Send a POST request without a body.
    pub async fn post(&self, path: &str) -> TestResponse {
        self.request("POST", path).await
    }

    /// Send a GET request and keep the raw body.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send_raw(request).await
    }

    /// Upload one file as a multipart form.
    pub async fn upload(&self, file_name: &str, mime_type: &str, data: &[u8]) -> TestResponse {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {mime_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        self.post_multipart(body).await
    }

    /// Post a multipart form carrying only a text field.
    pub async fn upload_without_file(&self) -> TestResponse {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nnothing here\r\n--{BOUNDARY}--\r\n"
        );
        self.post_multipart(body.into_bytes()).await
    }

    async fn post_multipart(&self, body: Vec<u8>) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/session/input")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Poll the session until it reaches `state`.
    pub async fn wait_for_state(&self, state: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.get("/api/v1/session").await;
            if response.body["state"] == state {
                return response.body;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "session never reached {state}, last seen: {}",
                    response.body
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn request(&self, method: &str, path: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let raw = self.send_raw(request).await;

        let body: Value = if raw.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw.body).unwrap_or(Value::Null)
        };

        TestResponse {
            status: raw.status,
            body,
        }
    }

    async fn send_raw(&self, request: Request<Body>) -> RawResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        RawResponse {
            status,
            headers,
            body,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
