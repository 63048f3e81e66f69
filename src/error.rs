use crate::session::PartialTranscript;
use crate::transport::TransportError;
use axum::http::StatusCode;
use thiserror::Error;

/// Errors surfaced to callers of the session manager
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),

    #[error("session {0} already exists")]
    AlreadyExists(String),

    #[error("session {0} belongs to another user")]
    Forbidden(String),

    #[error("session {0} is closed")]
    TransportClosed(String),

    #[error("session {session_id} exhausted its reconnect budget")]
    ReconnectExhausted {
        session_id: String,
        partial: Box<PartialTranscript>,
    },

    #[error("session {session_id} failed: {source}")]
    Transport {
        session_id: String,
        #[source]
        source: TransportError,
        partial: Box<PartialTranscript>,
    },

    #[error("failed to open recognition stream for {session_id}: {source}")]
    Open {
        session_id: String,
        #[source]
        source: TransportError,
    },
}

impl SessionError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "session_not_found",
            SessionError::AlreadyExists(_) => "already_exists",
            SessionError::Forbidden(_) => "forbidden",
            SessionError::TransportClosed(_) => "transport_closed",
            SessionError::ReconnectExhausted { .. } => "reconnect_exhausted",
            SessionError::Transport { .. } => "transport_failed",
            SessionError::Open { .. } => "transport_unavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::AlreadyExists(_) => StatusCode::CONFLICT,
            SessionError::Forbidden(_) => StatusCode::FORBIDDEN,
            SessionError::TransportClosed(_) => StatusCode::GONE,
            SessionError::ReconnectExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::Transport { .. } | SessionError::Open { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Text preserved up to the failure, when the error carries any
    pub fn partial(&self) -> Option<&PartialTranscript> {
        match self {
            SessionError::ReconnectExhausted { partial, .. }
            | SessionError::Transport { partial, .. } => Some(partial.as_ref()),
            _ => None,
        }
    }
}
