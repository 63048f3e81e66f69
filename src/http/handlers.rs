use super::extract::Owner;
use super::state::AppState;
use crate::error::SessionError;
use crate::session::{FinalTranscript, IngestReceipt, SessionDiagnostics, SessionStatus};
use crate::transport::AudioFormatHint;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Encoding, sample rate, language and vocabulary overrides
    pub audio_format: AudioFormatHint,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    /// Text preserved up to a terminal failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<SessionDiagnostics>,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let partial = self.partial().cloned();
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            partial_transcript: partial.as_ref().map(|p| p.transcript.clone()),
            diagnostics: partial.map(|p| p.diagnostics),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Start a new transcription session
pub async fn start_session(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(req): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<StartSessionResponse>), SessionError> {
    // Generate or use provided session ID
    let session_id = req
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Starting session {} for {}", session_id, owner);

    state
        .registry
        .create(&session_id, &owner, &req.audio_format)
        .await
        .map_err(|e| {
            warn!("Failed to start session {}: {}", session_id, e);
            e
        })?;

    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse {
            session_id: session_id.clone(),
            status: "active".to_string(),
            message: format!("Session {} started", session_id),
        }),
    ))
}

/// POST /sessions/:session_id/audio
/// Forward one audio chunk; returns before any transcript is produced
pub async fn ingest_chunk(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestReceipt>), SessionError> {
    let receipt = state
        .registry
        .ingest(&session_id, &owner, &body)
        .await
        .map_err(|e| {
            match &e {
                SessionError::ReconnectExhausted { .. } | SessionError::Transport { .. } => {
                    error!("Audio for session {} rejected: {}", session_id, e)
                }
                _ => warn!("Audio for session {} rejected: {}", session_id, e),
            }
            e
        })?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// POST /sessions/:session_id/finalize
/// Drain trailing results and return the reconciled transcript
pub async fn finalize_session(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
) -> Result<Json<FinalTranscript>, SessionError> {
    info!("Finalize requested for session {}", session_id);

    let transcript = state.registry.finalize(&session_id, &owner).await?;
    Ok(Json(transcript))
}

/// GET /sessions/:session_id
/// Get status of a live session
pub async fn get_session_status(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>, SessionError> {
    let status = state.registry.status(&session_id, &owner).await?;
    Ok(Json(status))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
