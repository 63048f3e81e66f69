use super::accumulator::{StreamSignal, TranscriptAccumulator};
use super::config::SessionPolicy;
use super::stats::{
    DrainOutcome, FinalTranscript, IngestReceipt, LinkPhase, PartialTranscript,
    SessionDiagnostics, SessionStatus,
};
use crate::error::SessionError;
use crate::transport::{
    AudioSink, RecognitionConfig, RecognitionTransport, TransportError, TransportEvent,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// State written by the event pumps and read by callers
struct SessionShared {
    accumulator: Mutex<TranscriptAccumulator>,

    /// Bumped after every applied event; the finalizer waits on it
    activity: watch::Sender<u64>,
}

impl SessionShared {
    fn new() -> Self {
        let (activity, _) = watch::channel(0);
        Self {
            accumulator: Mutex::new(TranscriptAccumulator::new()),
            activity,
        }
    }

    fn notify(&self) {
        self.activity.send_modify(|count| *count += 1);
    }
}

/// Transport link; only touched while holding the session's link lock
struct Link {
    phase: LinkPhase,
    sink: Option<Box<dyn AudioSink>>,
    pumps: Vec<JoinHandle<()>>,
    generation: u64,
    reconnect_count: u32,
    bytes_sent: u64,
    chunks_sent: u64,
    last_ingest: Instant,
}

/// Copy of the link counters readable without the link lock
#[derive(Debug, Clone, Copy)]
struct LinkView {
    phase: LinkPhase,
    reconnect_count: u32,
    bytes_sent: u64,
    chunks_sent: u64,
}

impl Link {
    fn view(&self) -> LinkView {
        LinkView {
            phase: self.phase,
            reconnect_count: self.reconnect_count,
            bytes_sent: self.bytes_sent,
            chunks_sent: self.chunks_sent,
        }
    }
}

/// One logical recording multiplexed onto a recognition stream
///
/// Ingest, reconnect and finalize serialize on the link lock, so a session
/// never has two live streams. Transport events are applied by one pump task
/// per stream generation.
pub struct StreamingSession {
    id: String,
    owner: String,
    started_at: DateTime<Utc>,
    recognition: RecognitionConfig,
    policy: SessionPolicy,
    transport: Arc<dyn RecognitionTransport>,
    shared: Arc<SessionShared>,
    link: Mutex<Link>,

    /// Last published link state; status reads it while a drain holds the lock
    link_view: watch::Sender<LinkView>,
}

impl fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSession")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("started_at", &self.started_at)
            .field("phase", &self.link_view.borrow().phase)
            .finish_non_exhaustive()
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        for pump in self.link.get_mut().pumps.drain(..) {
            pump.abort();
        }
    }
}

impl StreamingSession {
    /// Open the first recognition stream and start consuming its events
    pub async fn open(
        id: String,
        owner: String,
        recognition: RecognitionConfig,
        policy: SessionPolicy,
        transport: Arc<dyn RecognitionTransport>,
    ) -> Result<Self, SessionError> {
        info!(
            "Opening session {} for {} via {} transport",
            id,
            owner,
            transport.name()
        );

        let stream = transport
            .open(&recognition)
            .await
            .map_err(|source| SessionError::Open {
                session_id: id.clone(),
                source,
            })?;

        let shared = Arc::new(SessionShared::new());
        let pump = spawn_pump(id.clone(), 0, stream.events, Arc::clone(&shared));

        let link = Link {
            phase: LinkPhase::Active,
            sink: Some(stream.sink),
            pumps: vec![pump],
            generation: 0,
            reconnect_count: 0,
            bytes_sent: 0,
            chunks_sent: 0,
            last_ingest: Instant::now(),
        };
        let (link_view, _) = watch::channel(link.view());

        Ok(Self {
            id,
            owner,
            started_at: Utc::now(),
            recognition,
            policy,
            transport,
            shared,
            link: Mutex::new(link),
            link_view,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn recognition_config(&self) -> &RecognitionConfig {
        &self.recognition
    }

    /// Forward one audio chunk to the live stream
    ///
    /// Returns once the transport accepted the write. A timed-out stream is
    /// replaced first; a chunk whose write hits a timeout is replayed on the
    /// replacement stream.
    pub async fn ingest(&self, audio: &[u8]) -> Result<IngestReceipt, SessionError> {
        if audio.len() > self.policy.max_chunk_bytes {
            warn!(
                "Session {}: chunk of {} bytes exceeds the {} byte soft limit",
                self.id,
                audio.len(),
                self.policy.max_chunk_bytes
            );
        }

        let mut link = self.link.lock().await;
        link.last_ingest = Instant::now();

        let written = self.ingest_locked(&mut link, audio).await;
        self.publish(&link);
        written
    }

    async fn ingest_locked(
        &self,
        link: &mut Link,
        audio: &[u8],
    ) -> Result<IngestReceipt, SessionError> {
        loop {
            self.ensure_writable(link).await?;

            if audio.is_empty() {
                break;
            }

            let written = match link.sink.as_mut() {
                Some(sink) => sink.write(audio).await,
                None => Err(TransportError::Closed),
            };

            match written {
                Ok(()) => {
                    link.bytes_sent += audio.len() as u64;
                    link.chunks_sent += 1;
                    break;
                }
                Err(e) if e.is_timeout() => {
                    warn!(
                        "Session {}: write timed out ({}), replaying chunk on a new stream",
                        self.id, e
                    );
                    self.shared.accumulator.lock().await.mark_timed_out(e);
                }
                Err(e) => return Err(self.fail_locked(link, e).await),
            }
        }

        debug!(
            "Session {}: accepted {} bytes (total {})",
            self.id,
            audio.len(),
            link.bytes_sent
        );

        Ok(IngestReceipt {
            accepted: true,
            bytes: audio.len(),
            reconnect_count: link.reconnect_count,
        })
    }

    /// Replace the live stream if it has timed out
    ///
    /// Returns whether a new stream was opened. Concurrent calls serialize on the
    /// link lock; the second one finds the failure already cleared.
    pub async fn recover(&self) -> Result<bool, SessionError> {
        let mut link = self.link.lock().await;
        let generation = link.generation;
        let recovered = self.ensure_writable(&mut link).await;
        self.publish(&link);
        recovered?;
        Ok(link.generation != generation)
    }

    /// Check the link can take audio, reconnecting after a timeout
    async fn ensure_writable(&self, link: &mut Link) -> Result<(), SessionError> {
        match link.phase {
            LinkPhase::Draining | LinkPhase::Closed | LinkPhase::Failed => {
                return Err(SessionError::TransportClosed(self.id.clone()));
            }
            LinkPhase::Exhausted => return Err(self.exhausted_error(link.view()).await),
            LinkPhase::Active | LinkPhase::Reconnecting => {}
        }

        let signal = self.shared.accumulator.lock().await.signal().clone();
        match signal {
            StreamSignal::Open => Ok(()),
            StreamSignal::TimedOut(e) => {
                warn!("Session {}: stream timed out ({}), reconnecting", self.id, e);
                self.reconnect_locked(link).await
            }
            StreamSignal::Ended => {
                warn!(
                    "Session {}: stream ended while audio was still flowing, reconnecting",
                    self.id
                );
                self.reconnect_locked(link).await
            }
            StreamSignal::Failed(e) => Err(self.fail_locked(link, e).await),
        }
    }

    /// Swap in a fresh stream with the original configuration
    ///
    /// Accumulated text is untouched; the new stream's events feed the same
    /// accumulator.
    async fn reconnect_locked(&self, link: &mut Link) -> Result<(), SessionError> {
        if link.reconnect_count >= self.policy.max_reconnects {
            warn!(
                "Session {}: reconnect budget of {} spent",
                self.id, self.policy.max_reconnects
            );
            link.phase = LinkPhase::Exhausted;
            if let Some(mut sink) = link.sink.take() {
                sink.close().await;
            }
            return Err(self.exhausted_error(link.view()).await);
        }

        link.phase = LinkPhase::Reconnecting;
        if let Some(mut sink) = link.sink.take() {
            sink.close().await;
        }

        match self.transport.open(&self.recognition).await {
            Ok(stream) => {
                link.generation += 1;
                link.reconnect_count += 1;
                self.shared
                    .accumulator
                    .lock()
                    .await
                    .begin_generation(link.generation);

                link.pumps.push(spawn_pump(
                    self.id.clone(),
                    link.generation,
                    stream.events,
                    Arc::clone(&self.shared),
                ));
                link.sink = Some(stream.sink);
                link.phase = LinkPhase::Active;

                info!(
                    "Session {}: reconnected (attempt {}/{})",
                    self.id, link.reconnect_count, self.policy.max_reconnects
                );
                Ok(())
            }
            Err(e) => {
                error!("Session {}: reconnect failed: {}", self.id, e);
                link.phase = LinkPhase::Exhausted;
                Err(self.exhausted_error(link.view()).await)
            }
        }
    }

    /// End the session on a non-recoverable transport error
    async fn fail_locked(&self, link: &mut Link, source: TransportError) -> SessionError {
        error!("Session {}: transport failed: {}", self.id, source);
        link.phase = LinkPhase::Failed;
        if let Some(mut sink) = link.sink.take() {
            sink.close().await;
        }
        SessionError::Transport {
            session_id: self.id.clone(),
            source,
            partial: Box::new(self.partial(link.view()).await),
        }
    }

    async fn exhausted_error(&self, link: LinkView) -> SessionError {
        SessionError::ReconnectExhausted {
            session_id: self.id.clone(),
            partial: Box::new(self.partial(link).await),
        }
    }

    async fn partial(&self, link: LinkView) -> PartialTranscript {
        let acc = self.shared.accumulator.lock().await;
        PartialTranscript {
            transcript: acc.transcript(),
            diagnostics: self.diagnostics(link, &acc),
        }
    }

    fn publish(&self, link: &Link) {
        self.link_view.send_replace(link.view());
    }

    fn diagnostics(&self, link: LinkView, acc: &TranscriptAccumulator) -> SessionDiagnostics {
        let duration = Utc::now().signed_duration_since(self.started_at);
        SessionDiagnostics {
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            event_count: acc.event_count(),
            last_event_at: acc.last_event_at(),
            reconnect_count: link.reconnect_count,
            bytes_sent: link.bytes_sent,
            chunks_sent: link.chunks_sent,
            finalized_segments: acc.finalized_chunks().len(),
        }
    }

    /// Drain trailing results and produce the reconciled transcript
    ///
    /// Active -> Draining -> Closed. Draining ends on whichever comes first: a
    /// quiet period without events, the absolute finalize timeout, or an
    /// explicit end/error from the stream.
    pub async fn finalize(&self) -> Result<FinalTranscript, SessionError> {
        let mut link = self.link.lock().await;
        if link.phase == LinkPhase::Closed {
            return Err(SessionError::TransportClosed(self.id.clone()));
        }

        info!("Finalizing session {} ({:?})", self.id, link.phase);

        let drain_started = Instant::now();
        let was_live = matches!(link.phase, LinkPhase::Active | LinkPhase::Reconnecting);
        link.phase = LinkPhase::Draining;
        self.publish(&link);

        let drain = if was_live {
            let signal = self.shared.accumulator.lock().await.signal().clone();
            match signal {
                StreamSignal::Open => {
                    if let Some(sink) = link.sink.as_mut() {
                        if let Err(e) = sink.end_input().await {
                            warn!("Session {}: end of input not delivered: {}", self.id, e);
                        }
                    }
                    self.await_drain(drain_started).await
                }
                StreamSignal::Ended => DrainOutcome::StreamEnded,
                StreamSignal::TimedOut(_) | StreamSignal::Failed(_) => DrainOutcome::StreamFailed,
            }
        } else {
            DrainOutcome::StreamFailed
        };

        if let Some(mut sink) = link.sink.take() {
            sink.close().await;
        }
        for pump in link.pumps.drain(..) {
            pump.abort();
        }
        link.phase = LinkPhase::Closed;
        self.publish(&link);

        let acc = self.shared.accumulator.lock().await;
        let transcript = FinalTranscript {
            session_id: self.id.clone(),
            owner: self.owner.clone(),
            transcript: acc.transcript(),
            confidence: acc.confidence(),
            drain,
            diagnostics: self.diagnostics(link.view(), &acc),
        };

        info!(
            "Session {} finalized after {:?}: {} chars, {} events, {} reconnects ({:?})",
            self.id,
            drain_started.elapsed(),
            transcript.transcript.len(),
            transcript.diagnostics.event_count,
            transcript.diagnostics.reconnect_count,
            drain
        );

        Ok(transcript)
    }

    /// Race the quiet period against the absolute timeout
    async fn await_drain(&self, drain_started: Instant) -> DrainOutcome {
        let mut activity = self.shared.activity.subscribe();
        let hard_deadline = drain_started + self.policy.finalize_timeout;

        loop {
            let (signal, last_event) = {
                let acc = self.shared.accumulator.lock().await;
                (acc.signal().clone(), acc.last_event_instant())
            };

            match signal {
                StreamSignal::Open => {}
                StreamSignal::Ended => return DrainOutcome::StreamEnded,
                StreamSignal::TimedOut(_) | StreamSignal::Failed(_) => {
                    return DrainOutcome::StreamFailed
                }
            }

            // Quiet time only counts from the moment draining began
            let quiet_from = last_event.map_or(drain_started, |t| t.max(drain_started));
            let quiet_deadline = quiet_from + self.policy.quiet_period;

            let now = Instant::now();
            if now >= hard_deadline {
                return DrainOutcome::Timeout;
            }
            if now >= quiet_deadline {
                return DrainOutcome::QuietPeriod;
            }

            let wake_at = quiet_deadline.min(hard_deadline);
            tokio::select! {
                changed = activity.changed() => {
                    if changed.is_err() {
                        tokio::time::sleep_until(wake_at).await;
                    }
                }
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    /// Tear down without draining; accumulated text is discarded with the session
    pub async fn abandon(&self) {
        let mut link = self.link.lock().await;
        if let Some(mut sink) = link.sink.take() {
            sink.close().await;
        }
        for pump in link.pumps.drain(..) {
            pump.abort();
        }
        link.phase = LinkPhase::Closed;
        self.publish(&link);
        info!("Session {} abandoned", self.id);
    }

    /// Snapshot of the session for status queries
    ///
    /// Never waits on a running ingest or drain; link counters then come from
    /// the last published view.
    pub async fn status(&self) -> SessionStatus {
        let link = match self.link.try_lock() {
            Ok(link) => link.view(),
            Err(_) => *self.link_view.borrow(),
        };
        let acc = self.shared.accumulator.lock().await;
        SessionStatus {
            session_id: self.id.clone(),
            owner: self.owner.clone(),
            phase: link.phase,
            latest_interim: acc.latest_interim().to_string(),
            best_interim: acc.best_interim().to_string(),
            partial_transcript: acc.transcript(),
            diagnostics: self.diagnostics(link, &acc),
        }
    }

    /// Time since the last ingest or transport event; None while an operation is running
    pub async fn idle_for(&self) -> Option<Duration> {
        let link = self.link.try_lock().ok()?;
        let last_event = self.shared.accumulator.lock().await.last_event_instant();
        let last_activity = last_event.map_or(link.last_ingest, |t| t.max(link.last_ingest));
        Some(last_activity.elapsed())
    }
}

/// Consume one stream's events until it ends or fails
fn spawn_pump(
    session_id: String,
    generation: u64,
    mut events: mpsc::Receiver<TransportEvent>,
    shared: Arc<SessionShared>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Session {}: event pump #{} started", session_id, generation);

        while let Some(event) = events.recv().await {
            let terminal = {
                let mut acc = shared.accumulator.lock().await;
                match event {
                    TransportEvent::Result(result) => {
                        debug!(
                            "Session {}: {} result {:?}",
                            session_id,
                            if result.is_final { "final" } else { "interim" },
                            result.text
                        );
                        acc.apply_result(result);
                        false
                    }
                    TransportEvent::End => {
                        acc.apply_signal(generation, StreamSignal::Ended);
                        true
                    }
                    TransportEvent::Error(e) if e.is_timeout() => {
                        warn!("Session {}: stream #{} timed out: {}", session_id, generation, e);
                        acc.apply_signal(generation, StreamSignal::TimedOut(e));
                        true
                    }
                    TransportEvent::Error(e) => {
                        error!("Session {}: stream #{} failed: {}", session_id, generation, e);
                        acc.apply_signal(generation, StreamSignal::Failed(e));
                        true
                    }
                }
            };
            shared.notify();

            if terminal {
                break;
            }
        }

        // Channel closed without a terminal event
        if shared.accumulator.lock().await.close_generation(generation) {
            shared.notify();
        }

        debug!("Session {}: event pump #{} stopped", session_id, generation);
    })
}
