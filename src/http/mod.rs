//! HTTP API for the interview recorder frontend
//!
//! This module provides a REST API over the session registry:
//! - POST /sessions - Start a transcription session
//! - POST /sessions/:id/audio - Upload one audio chunk
//! - POST /sessions/:id/finalize - Drain and return the transcript
//! - GET /sessions/:id - Query session status
//! - GET /health - Health check
//!
//! The caller's identity is resolved upstream and passed in the `x-user-id` header.

mod extract;
mod handlers;
mod routes;
mod state;

pub use extract::{Owner, OWNER_HEADER};
pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
