//! Session API handlers.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use mp4forge_core::input::{select_input, InputFile, InputSummary, SUPPORTED_FORMATS_HINT};
use mp4forge_core::{ConversionOutcome, SessionError, SessionSnapshot, StartOutcome};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Message suitable for the user.
    pub error: String,
    /// Underlying cause.
    pub detail: String,
}

/// Response for an accepted input
#[derive(Debug, Serialize)]
pub struct InputResponse {
    pub input: InputSummary,
    pub preview_url: String,
    /// Path the preview can be fetched from.
    pub preview_path: String,
}

/// Response for a conversion request
#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    /// "started" or "already_running"
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<u64>,
}

/// Response for the session read model
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub supported_formats: &'static [&'static str],
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Maps a session error to an HTTP error response.
pub fn error_response(err: &SessionError) -> ApiError {
    let status = match err {
        SessionError::InvalidFile { .. } => StatusCode::BAD_REQUEST,
        SessionError::NotReady { .. } | SessionError::Busy => StatusCode::CONFLICT,
        SessionError::EngineLoad { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Transcode { .. }
        | SessionError::OutputMissing { .. }
        | SessionError::Disposed => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            detail: err.to_string(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    let message = message.into();
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.clone(),
            detail: message,
        }),
    )
}

async fn broadcast_state(state: &AppState) {
    let snapshot = state.session().snapshot().await;
    state.ws_broadcaster().session_changed(&snapshot);
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the session read model
pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(SessionResponse {
        snapshot: state.session().snapshot().await,
        supported_formats: SUPPORTED_FORMATS_HINT,
    })
}

/// Upload a new input.
///
/// The first part carrying a file is used; later parts are ignored. A form
/// without a file is a no-op that returns the current session. While a
/// conversion runs every upload gets 409, whatever its type.
pub async fn upload_input(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut first: Option<InputFile> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(bad_request(format!("Invalid multipart body: {}", e))),
        };

        if first.is_some() {
            continue;
        }
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Failed to read file: {}", e)))?;

        first = Some(InputFile::new(name, mime_type, data));
    }

    let Some(file) = select_input(first) else {
        debug!("Upload without a file, nothing to do");
        return Ok(get_session(State(state)).await.into_response());
    };

    match state.session().accept_input(file).await {
        Ok((input, preview)) => {
            broadcast_state(&state).await;
            Ok(Json(InputResponse {
                input,
                preview_url: preview.to_string(),
                preview_path: format!("/api/v1/blobs/{}", preview.id()),
            })
            .into_response())
        }
        Err(e) => {
            warn!("Input rejected: {}", e);
            Err(error_response(&e))
        }
    }
}

/// Start a conversion of the current input
pub async fn start_conversion(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<ConvertResponse>), ApiError> {
    let outcome = state
        .session()
        .start_conversion()
        .await
        .map_err(|e| error_response(&e))?;

    match outcome {
        StartOutcome::Started(handle) => {
            let run = handle.run();
            broadcast_state(&state).await;

            let state = Arc::clone(&state);
            tokio::spawn(async move {
                match handle.wait().await {
                    Ok(ConversionOutcome::Completed(report)) => {
                        info!(
                            "Run {} finished, {} bytes ready for download",
                            report.run, report.output_size_bytes
                        );
                    }
                    Ok(ConversionOutcome::Abandoned { run }) => {
                        debug!("Run {} was abandoned", run);
                    }
                    Ok(ConversionOutcome::AlreadyRunning) => {}
                    Err(e) => {
                        error!("Run {} failed: {}", run, e);
                    }
                }
                broadcast_state(&state).await;
            });

            Ok((
                StatusCode::ACCEPTED,
                Json(ConvertResponse {
                    status: "started",
                    run: Some(run),
                }),
            ))
        }
        StartOutcome::AlreadyRunning => Ok((
            StatusCode::OK,
            Json(ConvertResponse {
                status: "already_running",
                run: None,
            }),
        )),
    }
}

/// Download the converted output
pub async fn download_output(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let download = state
        .session()
        .download()
        .await
        .map_err(|e| error_response(&e))?;

    Ok((
        [
            (header::CONTENT_TYPE, download.mime_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.file_name),
            ),
        ],
        download.data,
    )
        .into_response())
}

/// Reset the session to idle
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .session()
        .reset()
        .await
        .map_err(|e| error_response(&e))?;

    let snapshot = state.session().snapshot().await;
    state.ws_broadcaster().session_changed(&snapshot);
    Ok(Json(snapshot))
}

/// Serve a live transient URL, e.g. the input preview
pub async fn get_blob(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, StatusCode> {
    let blob = state
        .session()
        .resolve_url(&id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(([(header::CONTENT_TYPE, blob.mime_type)], blob.data).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mp4forge_core::session::{CONVERSION_FAILED_MESSAGE, INVALID_FILE_MESSAGE};

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                SessionError::InvalidFile {
                    name: "notes.txt".to_string(),
                    mime_type: "text/plain".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (SessionError::not_ready("no input"), StatusCode::CONFLICT),
            (SessionError::Busy, StatusCode::CONFLICT),
            (
                SessionError::EngineLoad {
                    reason: "core missing".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                SessionError::Transcode {
                    reason: "exit 1".to_string(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (SessionError::Disposed, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let (status, _) = error_response(&err);
            assert_eq!(status, expected, "{err}");
        }
    }

    #[test]
    fn test_error_body_uses_user_message() {
        let (_, Json(body)) = error_response(&SessionError::InvalidFile {
            name: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
        });
        assert_eq!(body.error, INVALID_FILE_MESSAGE);
        assert!(body.detail.contains("text/plain"));

        let (_, Json(body)) = error_response(&SessionError::OutputMissing {
            name: "output.mp4".to_string(),
        });
        assert_eq!(body.error, CONVERSION_FAILED_MESSAGE);
    }
}
