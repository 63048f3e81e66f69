use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a session's transport link stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    /// Stream open and accepting audio
    Active,
    /// Replacing a timed-out stream
    Reconnecting,
    /// Reconnect budget spent; audio is refused
    Exhausted,
    /// Non-recoverable transport error; audio is refused
    Failed,
    /// End of input sent, waiting for trailing results
    Draining,
    /// Finalized and torn down
    Closed,
}

/// How the finalize drain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// No events for a full quiet period
    QuietPeriod,
    /// Hit the absolute finalize ceiling
    Timeout,
    /// Transport signalled end of stream
    StreamEnded,
    /// Transport failed, or was already unusable, so nothing was awaited
    StreamFailed,
}

/// Liveness and volume counters for a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDiagnostics {
    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Seconds since start
    pub duration_secs: f64,

    /// Transport events observed across all streams
    pub event_count: u64,

    /// When the last transport event arrived
    pub last_event_at: Option<DateTime<Utc>>,

    /// Streams replaced after a timeout
    pub reconnect_count: u32,

    /// Audio bytes accepted by the transport
    pub bytes_sent: u64,

    /// Audio chunks accepted by the transport
    pub chunks_sent: u64,

    /// Final results kept so far
    pub finalized_segments: usize,
}

/// Reconciled result of a finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalTranscript {
    pub session_id: String,
    pub owner: String,
    pub transcript: String,
    /// Confidence of the last final result (0 if none)
    pub confidence: f32,
    pub drain: DrainOutcome,
    pub diagnostics: SessionDiagnostics,
}

/// Best-effort text handed back on terminal errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialTranscript {
    pub transcript: String,
    pub diagnostics: SessionDiagnostics,
}

/// Point-in-time view of a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub owner: String,
    pub phase: LinkPhase,
    pub latest_interim: String,
    pub best_interim: String,
    pub partial_transcript: String,
    pub diagnostics: SessionDiagnostics,
}

/// Acknowledgement for an accepted audio chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub accepted: bool,
    pub bytes: usize,
    pub reconnect_count: u32,
}
