//! Recognition transport seam
//!
//! A transport turns a [`RecognitionConfig`] into a duplex stream:
//! - an [`AudioSink`] that accepts binary audio frames and an end-of-input signal
//! - an ordered channel of [`TransportEvent`]s (interim/final results, end, error)
//!
//! Implementations:
//! - [`crate::nats::NatsTransport`]: speech service reached over NATS subjects
//! - [`memory::MemoryTransport`]: scripted in-process transport for tests and local runs

pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::{MemoryStream, MemoryTransport};

/// gRPC-style status code the speech service uses for an expired deadline
pub const DEADLINE_EXCEEDED_CODE: i32 = 4;

/// Capacity of the per-stream event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Audio encodings the speech service accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    Linear16,
    Flac,
    WebmOpus,
    OggOpus,
}

impl AudioEncoding {
    /// Containerised codecs carry their own sample rate
    pub fn requires_sample_rate(&self) -> bool {
        matches!(self, AudioEncoding::Linear16 | AudioEncoding::Flac)
    }
}

/// Configuration a transport stream is opened with; reused verbatim on reconnect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// BCP-47 language, e.g. "en-US"
    pub language_code: String,

    pub encoding: AudioEncoding,

    /// Required for raw PCM and FLAC, ignored for Opus containers
    pub sample_rate_hz: Option<u32>,

    /// Recognition model, e.g. "latest_long"
    pub model: String,

    pub enable_automatic_punctuation: bool,

    /// Streaming sessions always ask for interim results
    pub interim_results: bool,

    /// Domain vocabulary to bias recognition towards
    pub boost_terms: Vec<String>,

    pub boost: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language_code: "en-US".to_string(),
            encoding: AudioEncoding::WebmOpus,
            sample_rate_hz: None,
            model: "latest_long".to_string(),
            enable_automatic_punctuation: true,
            interim_results: true,
            boost_terms: Vec::new(),
            boost: 10.0,
        }
    }
}

/// Caller-supplied overrides applied on top of the service defaults at session start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormatHint {
    pub encoding: Option<AudioEncoding>,
    pub sample_rate_hz: Option<u32>,
    pub language_code: Option<String>,
    pub boost_terms: Vec<String>,
}

impl RecognitionConfig {
    /// Overlay a caller hint; boost terms are merged, not replaced
    pub fn with_hint(mut self, hint: &AudioFormatHint) -> Self {
        if let Some(encoding) = hint.encoding {
            self.encoding = encoding;
        }
        if let Some(rate) = hint.sample_rate_hz {
            self.sample_rate_hz = Some(rate);
        }
        if let Some(language) = hint.language_code.as_ref().filter(|l| !l.is_empty()) {
            self.language_code = language.clone();
        }
        for term in &hint.boost_terms {
            if !self.boost_terms.iter().any(|t| t.eq_ignore_ascii_case(term)) {
                self.boost_terms.push(term.clone());
            }
        }
        if self.encoding.requires_sample_rate() && self.sample_rate_hz.is_none() {
            self.sample_rate_hz = Some(16000);
        }
        self.interim_results = true;
        self
    }
}

/// One recognition hypothesis emitted by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    pub is_final: bool,
    pub confidence: Option<f32>,
}

impl RecognitionResult {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence: None,
        }
    }

    pub fn final_result(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence: Some(confidence),
        }
    }
}

/// Events delivered in transport order on a stream's event channel
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Result(RecognitionResult),
    /// The remote side finished the stream
    End,
    /// The stream failed; no further events follow
    Error(TransportError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("recognition stream failed (code {code}): {details}")]
    Status { code: i32, details: String },

    #[error("transport stream is closed")]
    Closed,

    #[error("transport connection failed: {0}")]
    Connect(String),
}

impl TransportError {
    /// Timeout-class errors are recovered by reconnecting; everything else ends the session
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::DeadlineExceeded(_) => true,
            TransportError::Status { code, details } => {
                if *code == DEADLINE_EXCEEDED_CODE {
                    return true;
                }
                let details = details.to_ascii_lowercase();
                details.contains("request timeout") || details.contains("audio timeout")
            }
            TransportError::Closed | TransportError::Connect(_) => false,
        }
    }
}

/// Write side of an open recognition stream
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// Write one audio frame; returns once the transport has accepted it
    async fn write(&mut self, audio: &[u8]) -> Result<(), TransportError>;

    /// Signal that no more audio will follow; results may still arrive afterwards
    async fn end_input(&mut self) -> Result<(), TransportError>;

    /// Tear the stream down (best effort)
    async fn close(&mut self);
}

/// An opened stream: the sink plus its event channel
pub struct TransportStream {
    pub sink: Box<dyn AudioSink>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Factory for recognition streams
///
/// Implementations:
/// - NATS: speech service behind `stt.stream.*` subjects
/// - Memory: scripted streams for tests
#[async_trait::async_trait]
pub trait RecognitionTransport: Send + Sync {
    /// Open a new, independent recognition stream
    async fn open(&self, config: &RecognitionConfig) -> Result<TransportStream, TransportError>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(TransportError::DeadlineExceeded("stream deadline".into()).is_timeout());
        assert!(TransportError::Status {
            code: DEADLINE_EXCEEDED_CODE,
            details: "deadline".into()
        }
        .is_timeout());
        assert!(TransportError::Status {
            code: 3,
            details: "Request Timeout: no audio received".into()
        }
        .is_timeout());
        assert!(TransportError::Status {
            code: 11,
            details: "Audio Timeout Error: Long duration elapsed without audio".into()
        }
        .is_timeout());

        assert!(!TransportError::Status {
            code: 7,
            details: "permission denied".into()
        }
        .is_timeout());
        assert!(!TransportError::Closed.is_timeout());
        assert!(!TransportError::Connect("refused".into()).is_timeout());
    }

    #[test]
    fn test_hint_overlays_defaults() {
        let base = RecognitionConfig {
            boost_terms: vec!["leadership".to_string()],
            ..Default::default()
        };
        let hint = AudioFormatHint {
            encoding: Some(AudioEncoding::Linear16),
            sample_rate_hz: None,
            language_code: Some("en-GB".to_string()),
            boost_terms: vec!["Leadership".to_string(), "conflict".to_string()],
        };

        let config = base.with_hint(&hint);
        assert_eq!(config.encoding, AudioEncoding::Linear16);
        assert_eq!(config.sample_rate_hz, Some(16000));
        assert_eq!(config.language_code, "en-GB");
        assert_eq!(config.boost_terms, vec!["leadership", "conflict"]);
        assert!(config.interim_results);
    }

    #[test]
    fn test_empty_hint_keeps_defaults() {
        let config = RecognitionConfig::default().with_hint(&AudioFormatHint::default());
        assert_eq!(config, RecognitionConfig::default());
    }
}
