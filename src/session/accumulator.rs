//! Result accumulator
//!
//! Applies transport events to the session transcript state. Results from any
//! stream generation are kept; end and error signals only count for the stream
//! that is currently live, so a late signal from a replaced stream cannot
//! fail the session.

use super::reconcile::reconcile;
use crate::transport::{RecognitionResult, TransportError};
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Terminal signal observed on the live stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    Open,
    /// Timeout-class error; recoverable by reconnecting
    TimedOut(TransportError),
    /// Any other error; ends the session
    Failed(TransportError),
    /// Remote side finished the stream
    Ended,
}

#[derive(Debug)]
pub struct TranscriptAccumulator {
    finalized_chunks: Vec<String>,
    latest_interim: String,
    /// Longest interim of the whole session; never shrinks
    best_interim: String,
    /// Longest interim since the last final result
    pending_interim: String,
    confidence: f32,
    event_count: u64,
    last_event_at: Option<DateTime<Utc>>,
    last_event_instant: Option<Instant>,
    generation: u64,
    signal: StreamSignal,
}

impl Default for TranscriptAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self {
            finalized_chunks: Vec::new(),
            latest_interim: String::new(),
            best_interim: String::new(),
            pending_interim: String::new(),
            confidence: 0.0,
            event_count: 0,
            last_event_at: None,
            last_event_instant: None,
            generation: 0,
            signal: StreamSignal::Open,
        }
    }

    fn touch(&mut self) {
        self.event_count += 1;
        self.last_event_at = Some(Utc::now());
        self.last_event_instant = Some(Instant::now());
    }

    /// Apply an interim or final result
    pub fn apply_result(&mut self, result: RecognitionResult) {
        self.touch();

        if result.is_final {
            let text = result.text.trim();
            if !text.is_empty() {
                self.finalized_chunks.push(text.to_string());
            }
            if let Some(confidence) = result.confidence {
                self.confidence = confidence;
            }
            // The final supersedes whatever interim was pending for this utterance
            self.latest_interim.clear();
            self.pending_interim.clear();
        } else {
            let len = result.text.chars().count();
            if len > self.best_interim.chars().count() {
                self.best_interim = result.text.clone();
            }
            if len > self.pending_interim.chars().count() {
                self.pending_interim = result.text.clone();
            }
            self.latest_interim = result.text;
        }
    }

    /// Record an end or error signal from stream `generation`; ignored for replaced streams
    pub fn apply_signal(&mut self, generation: u64, signal: StreamSignal) -> bool {
        self.touch();

        if generation != self.generation {
            return false;
        }
        // The first terminal signal on a stream wins
        if self.signal != StreamSignal::Open {
            return false;
        }
        self.signal = signal;
        true
    }

    /// The stream's event channel closed without an end or error
    pub fn close_generation(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.signal != StreamSignal::Open {
            return false;
        }
        self.signal = StreamSignal::Ended;
        true
    }

    /// Switch to a freshly opened stream, clearing the failure flag
    pub fn begin_generation(&mut self, generation: u64) {
        self.generation = generation;
        self.signal = StreamSignal::Open;
    }

    /// Mark the live stream as timed out (e.g. a write hit a deadline)
    pub fn mark_timed_out(&mut self, error: TransportError) {
        if self.signal == StreamSignal::Open {
            self.signal = StreamSignal::TimedOut(error);
        }
    }

    pub fn signal(&self) -> &StreamSignal {
        &self.signal
    }

    pub fn failure_flag(&self) -> bool {
        matches!(self.signal, StreamSignal::TimedOut(_))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn finalized_chunks(&self) -> &[String] {
        &self.finalized_chunks
    }

    pub fn latest_interim(&self) -> &str {
        &self.latest_interim
    }

    pub fn best_interim(&self) -> &str {
        &self.best_interim
    }

    pub fn pending_interim(&self) -> &str {
        &self.pending_interim
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.last_event_at
    }

    pub fn last_event_instant(&self) -> Option<Instant> {
        self.last_event_instant
    }

    /// Reconciled transcript of everything seen so far
    pub fn transcript(&self) -> String {
        reconcile(
            &self.finalized_chunks,
            &self.latest_interim,
            &self.pending_interim,
        )
    }
}
