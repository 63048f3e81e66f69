//! Scripted in-process transport
//!
//! Every `open` creates a [`MemoryStream`] the driver keeps a handle to. The driver
//! injects recognition events and inspects what the session wrote.

use super::{
    AudioSink, RecognitionConfig, RecognitionResult, RecognitionTransport, TransportError,
    TransportEvent, TransportStream, EVENT_CHANNEL_CAPACITY,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
struct TransportState {
    streams: Vec<MemoryStream>,
    fail_next_open: Option<TransportError>,
}

/// In-memory [`RecognitionTransport`]
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of streams opened so far
    pub fn open_count(&self) -> usize {
        self.state().streams.len()
    }

    /// Stream opened `index`-th (0-based)
    pub fn stream(&self, index: usize) -> Option<MemoryStream> {
        self.state().streams.get(index).cloned()
    }

    /// Most recently opened stream
    pub fn latest(&self) -> Option<MemoryStream> {
        self.state().streams.last().cloned()
    }

    /// Make the next `open` fail with `error`
    pub fn fail_next_open(&self, error: TransportError) {
        self.state().fail_next_open = Some(error);
    }
}

#[async_trait::async_trait]
impl RecognitionTransport for MemoryTransport {
    async fn open(&self, config: &RecognitionConfig) -> Result<TransportStream, TransportError> {
        let mut state = self.state();
        if let Some(error) = state.fail_next_open.take() {
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let stream = MemoryStream {
            shared: Arc::new(StreamShared {
                index: state.streams.len(),
                config: config.clone(),
                events: tx,
                io: Mutex::new(StreamIo::default()),
            }),
        };
        state.streams.push(stream.clone());
        debug!("Opened memory stream #{}", stream.index());

        Ok(TransportStream {
            sink: Box::new(MemorySink { stream }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[derive(Default)]
struct StreamIo {
    frames: Vec<Vec<u8>>,
    input_ended: bool,
    closed: bool,
    fail_next_write: Option<TransportError>,
}

struct StreamShared {
    index: usize,
    config: RecognitionConfig,
    events: mpsc::Sender<TransportEvent>,
    io: Mutex<StreamIo>,
}

/// Driver-side handle to one opened stream
#[derive(Clone)]
pub struct MemoryStream {
    shared: Arc<StreamShared>,
}

impl MemoryStream {
    fn io(&self) -> MutexGuard<'_, StreamIo> {
        self.shared.io.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn index(&self) -> usize {
        self.shared.index
    }

    /// Configuration the stream was opened with
    pub fn config(&self) -> &RecognitionConfig {
        &self.shared.config
    }

    /// Push an event to the session; false if the consumer is gone
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.shared.events.try_send(event).is_ok()
    }

    pub fn emit_interim(&self, text: &str) -> bool {
        self.emit(TransportEvent::Result(RecognitionResult::interim(text)))
    }

    pub fn emit_final(&self, text: &str, confidence: f32) -> bool {
        self.emit(TransportEvent::Result(RecognitionResult::final_result(
            text, confidence,
        )))
    }

    pub fn emit_error(&self, error: TransportError) -> bool {
        self.emit(TransportEvent::Error(error))
    }

    pub fn emit_end(&self) -> bool {
        self.emit(TransportEvent::End)
    }

    /// Audio frames written to this stream, in order
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.io().frames.clone()
    }

    pub fn bytes_received(&self) -> usize {
        self.io().frames.iter().map(Vec::len).sum()
    }

    pub fn input_ended(&self) -> bool {
        self.io().input_ended
    }

    pub fn is_closed(&self) -> bool {
        self.io().closed
    }

    /// Make the next write on this stream fail with `error`
    pub fn fail_next_write(&self, error: TransportError) {
        self.io().fail_next_write = Some(error);
    }
}

struct MemorySink {
    stream: MemoryStream,
}

#[async_trait::async_trait]
impl AudioSink for MemorySink {
    async fn write(&mut self, audio: &[u8]) -> Result<(), TransportError> {
        let mut io = self.stream.io();
        if io.closed || io.input_ended {
            return Err(TransportError::Closed);
        }
        if let Some(error) = io.fail_next_write.take() {
            return Err(error);
        }
        io.frames.push(audio.to_vec());
        Ok(())
    }

    async fn end_input(&mut self) -> Result<(), TransportError> {
        let mut io = self.stream.io();
        if io.closed {
            return Err(TransportError::Closed);
        }
        io.input_ended = true;
        Ok(())
    }

    async fn close(&mut self) {
        self.stream.io().closed = true;
    }
}
