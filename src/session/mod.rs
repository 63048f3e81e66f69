//! Streaming transcription sessions
//!
//! This module provides the `StreamingSession` abstraction that manages:
//! - Forwarding uploaded audio chunks to a recognition stream
//! - Reconnecting timed-out streams without losing accumulated text
//! - Accumulating interim and final results
//! - Draining trailing results and reconciling the final transcript

mod accumulator;
mod config;
mod reconcile;
mod session;
mod stats;

pub use accumulator::{StreamSignal, TranscriptAccumulator};
pub use config::SessionPolicy;
pub use reconcile::reconcile;
pub use session::StreamingSession;
pub use stats::{
    DrainOutcome, FinalTranscript, IngestReceipt, LinkPhase, PartialTranscript,
    SessionDiagnostics, SessionStatus,
};
