use crate::transport::RecognitionConfig;
use serde::{Deserialize, Serialize};

/// Announces a new recognition stream on `stt.stream.start`
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamStartMessage {
    pub stream_id: String,
    pub config: RecognitionConfig,
    pub timestamp: String, // RFC3339 timestamp
}

/// Audio frame published on `audio.frame.<stream_id>`
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub stream_id: String,
    pub sequence: u64,
    pub audio: String, // Base64-encoded audio bytes
    pub timestamp: String,
    /// End-of-input marker (empty audio)
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Recognition result received on `stt.stream.<stream_id>.result`
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub stream_id: String,
    pub text: String,
    pub partial: bool,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Stream failure received on `stt.stream.<stream_id>.error`
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamErrorMessage {
    pub stream_id: String,
    pub code: i32,
    #[serde(default)]
    pub details: String,
}
