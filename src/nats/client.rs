use super::messages::{
    AudioFrameMessage, StreamErrorMessage, StreamStartMessage, TranscriptMessage,
};
use crate::registry::TranscriptSink;
use crate::session::FinalTranscript;
use crate::transport::{
    AudioSink, RecognitionConfig, RecognitionResult, RecognitionTransport, TransportError,
    TransportEvent, TransportStream, DEADLINE_EXCEEDED_CODE, EVENT_CHANNEL_CAPACITY,
};
use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const STREAM_START_SUBJECT: &str = "stt.stream.start";

pub fn audio_subject(stream_id: &str) -> String {
    format!("audio.frame.{}", stream_id)
}

pub fn stream_events_subject(stream_id: &str) -> String {
    format!("stt.stream.{}.>", stream_id)
}

pub fn transcript_subject(session_id: &str) -> String {
    format!("transcripts.final.{}", session_id)
}

/// Speech service reached over NATS
#[derive(Clone)]
pub struct NatsTransport {
    client: Client,
}

impl NatsTransport {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Hand a finalized transcript to downstream persistence
    pub async fn publish_transcript(&self, transcript: &FinalTranscript) -> Result<()> {
        let subject = transcript_subject(&transcript.session_id);
        let payload = serde_json::to_vec(transcript)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish transcript")?;

        info!(
            "Published transcript to {} ({} chars)",
            subject,
            transcript.transcript.len()
        );

        Ok(())
    }
}

#[async_trait::async_trait]
impl RecognitionTransport for NatsTransport {
    async fn open(&self, config: &RecognitionConfig) -> Result<TransportStream, TransportError> {
        let stream_id = uuid::Uuid::new_v4().to_string();

        // Subscribe before announcing so no early result is missed
        let subject = stream_events_subject(&stream_id);
        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let start = StreamStartMessage {
            stream_id: stream_id.clone(),
            config: config.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let payload =
            serde_json::to_vec(&start).map_err(|e| TransportError::Connect(e.to_string()))?;
        self.client
            .publish(STREAM_START_SUBJECT.to_string(), payload.into())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!("Opened recognition stream {} (listening on {})", stream_id, subject);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let forward_task = tokio::spawn(forward_events(stream_id.clone(), subscriber, tx));

        Ok(TransportStream {
            sink: Box::new(NatsAudioSink {
                client: self.client.clone(),
                frames: FrameSequencer::new(stream_id),
                forward_task: Some(forward_task),
            }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}

#[async_trait::async_trait]
impl TranscriptSink for NatsTransport {
    async fn deliver(&self, transcript: &FinalTranscript) -> Result<()> {
        self.publish_transcript(transcript).await
    }
}

/// Map subscriber messages onto the stream's event channel
async fn forward_events(
    stream_id: String,
    mut subscriber: async_nats::Subscriber,
    tx: mpsc::Sender<TransportEvent>,
) {
    while let Some(msg) = subscriber.next().await {
        let event = match decode_event(msg.subject.as_str(), &msg.payload) {
            Some(event) => event,
            None => continue,
        };

        let terminal = !matches!(event, TransportEvent::Result(_));
        if tx.send(event).await.is_err() {
            break;
        }
        if terminal {
            break;
        }
    }

    debug!("Event forwarding stopped for stream {}", stream_id);
}

/// Decode a message from `stt.stream.<id>.{result,error,end}`
pub fn decode_event(subject: &str, payload: &[u8]) -> Option<TransportEvent> {
    let kind = subject.rsplit('.').next().unwrap_or_default();

    match kind {
        "result" => match serde_json::from_slice::<TranscriptMessage>(payload) {
            Ok(msg) => Some(TransportEvent::Result(RecognitionResult {
                text: msg.text,
                is_final: !msg.partial,
                confidence: msg.confidence,
            })),
            Err(e) => {
                warn!("Failed to parse transcript message: {}", e);
                None
            }
        },
        "error" => match serde_json::from_slice::<StreamErrorMessage>(payload) {
            Ok(msg) if msg.code == DEADLINE_EXCEEDED_CODE => Some(TransportEvent::Error(
                TransportError::DeadlineExceeded(msg.details),
            )),
            Ok(msg) => Some(TransportEvent::Error(TransportError::Status {
                code: msg.code,
                details: msg.details,
            })),
            Err(e) => {
                warn!("Failed to parse stream error message: {}", e);
                Some(TransportEvent::Error(TransportError::Status {
                    code: -1,
                    details: format!("unparseable error message: {}", e),
                }))
            }
        },
        "end" => Some(TransportEvent::End),
        other => {
            debug!("Ignoring message on unknown subject suffix {:?}", other);
            None
        }
    }
}

/// Frame numbering and end-of-input bookkeeping for one stream
struct FrameSequencer {
    stream_id: String,
    sequence: u64,
    input_ended: bool,
}

impl FrameSequencer {
    fn new(stream_id: String) -> Self {
        Self {
            stream_id,
            sequence: 0,
            input_ended: false,
        }
    }

    fn next_frame(&mut self, audio: &[u8], is_final: bool) -> AudioFrameMessage {
        let message = AudioFrameMessage {
            stream_id: self.stream_id.clone(),
            sequence: self.sequence,
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };
        self.sequence += 1;
        if is_final {
            self.input_ended = true;
        }
        message
    }

    /// End-of-input marker still owed to the speech service, if any
    fn closing_frame(&mut self) -> Option<AudioFrameMessage> {
        if self.input_ended {
            None
        } else {
            Some(self.next_frame(&[], true))
        }
    }
}

struct NatsAudioSink {
    client: Client,
    frames: FrameSequencer,
    forward_task: Option<JoinHandle<()>>,
}

impl NatsAudioSink {
    async fn send(&self, message: AudioFrameMessage) -> Result<(), TransportError> {
        let payload =
            serde_json::to_vec(&message).map_err(|e| TransportError::Connect(e.to_string()))?;

        self.client
            .publish(audio_subject(&message.stream_id), payload.into())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(
            "Published audio frame (stream={}, seq={}, final={})",
            message.stream_id, message.sequence, message.final_frame
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl AudioSink for NatsAudioSink {
    async fn write(&mut self, audio: &[u8]) -> Result<(), TransportError> {
        if self.forward_task.is_none() {
            return Err(TransportError::Closed);
        }
        let frame = self.frames.next_frame(audio, false);
        self.send(frame).await
    }

    async fn end_input(&mut self) -> Result<(), TransportError> {
        if self.forward_task.is_none() {
            return Err(TransportError::Closed);
        }
        let frame = self.frames.next_frame(&[], true);
        self.send(frame).await
    }

    async fn close(&mut self) {
        let Some(task) = self.forward_task.take() else {
            return;
        };

        // Let the speech service release the stream instead of timing it out
        if let Some(frame) = self.frames.closing_frame() {
            if let Err(e) = self.send(frame).await {
                debug!(
                    "End of input for stream {} not delivered on close: {}",
                    self.frames.stream_id, e
                );
            }
        }

        task.abort();
        info!("Closed recognition stream {}", self.frames.stream_id);
    }
}

impl Drop for NatsAudioSink {
    fn drop(&mut self) {
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
    }
}
