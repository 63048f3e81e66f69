use crate::error::SessionError;
use crate::session::{
    FinalTranscript, IngestReceipt, SessionPolicy, SessionStatus, StreamingSession,
};
use crate::transport::{AudioFormatHint, RecognitionConfig, RecognitionTransport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Downstream consumer of finalized transcripts (e.g. persistence)
#[async_trait::async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn deliver(&self, transcript: &FinalTranscript) -> anyhow::Result<()>;
}

/// In-memory table of live sessions (session_id → session)
///
/// Built once at startup with its collaborators injected; tests build their
/// own isolated instances.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<StreamingSession>>>,
    transport: Arc<dyn RecognitionTransport>,
    policy: SessionPolicy,
    recognition: RecognitionConfig,
    sink: Option<Arc<dyn TranscriptSink>>,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn RecognitionTransport>,
        policy: SessionPolicy,
        recognition: RecognitionConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            transport,
            policy,
            recognition,
            sink: None,
        }
    }

    /// Hand every finalized transcript to `sink`
    pub fn with_transcript_sink(mut self, sink: Arc<dyn TranscriptSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Register a new session and open its first recognition stream
    pub async fn create(
        &self,
        id: &str,
        owner: &str,
        hint: &AudioFormatHint,
    ) -> Result<Arc<StreamingSession>, SessionError> {
        if self.sessions.read().await.contains_key(id) {
            return Err(SessionError::AlreadyExists(id.to_string()));
        }

        // Open outside the map lock; other sessions keep working meanwhile
        let recognition = self.recognition.clone().with_hint(hint);
        let session = Arc::new(
            StreamingSession::open(
                id.to_string(),
                owner.to_string(),
                recognition,
                self.policy.clone(),
                Arc::clone(&self.transport),
            )
            .await?,
        );

        {
            let mut sessions = self.sessions.write().await;
            if !sessions.contains_key(id) {
                sessions.insert(id.to_string(), Arc::clone(&session));
                info!("Session {} registered ({} live)", id, sessions.len());
                return Ok(session);
            }
        }

        // Lost a creation race for the same id
        warn!("Session {} was created concurrently; discarding duplicate stream", id);
        session.abandon().await;
        Err(SessionError::AlreadyExists(id.to_string()))
    }

    pub async fn get(&self, id: &str) -> Result<Arc<StreamingSession>, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Look up a session and check it belongs to `owner`
    pub async fn get_owned(
        &self,
        id: &str,
        owner: &str,
    ) -> Result<Arc<StreamingSession>, SessionError> {
        let session = self.get(id).await?;
        if session.owner() != owner {
            warn!("User {} denied access to session {}", owner, id);
            return Err(SessionError::Forbidden(id.to_string()));
        }
        Ok(session)
    }

    /// Unregister a session and tear down its stream without draining
    pub async fn remove(&self, id: &str) -> Option<Arc<StreamingSession>> {
        let session = self.sessions.write().await.remove(id)?;
        session.abandon().await;
        Some(session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn ingest(
        &self,
        id: &str,
        owner: &str,
        audio: &[u8],
    ) -> Result<IngestReceipt, SessionError> {
        let session = self.get_owned(id, owner).await?;
        session.ingest(audio).await
    }

    pub async fn status(&self, id: &str, owner: &str) -> Result<SessionStatus, SessionError> {
        let session = self.get_owned(id, owner).await?;
        Ok(session.status().await)
    }

    /// Drain, reconcile and unregister a session
    pub async fn finalize(&self, id: &str, owner: &str) -> Result<FinalTranscript, SessionError> {
        let session = self.get_owned(id, owner).await?;
        self.finalize_session(&session).await
    }

    async fn finalize_session(
        &self,
        session: &Arc<StreamingSession>,
    ) -> Result<FinalTranscript, SessionError> {
        let transcript = session.finalize().await?;

        {
            let mut sessions = self.sessions.write().await;
            if sessions
                .get(session.id())
                .is_some_and(|current| Arc::ptr_eq(current, session))
            {
                sessions.remove(session.id());
            }
        }

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.deliver(&transcript).await {
                error!(
                    "Failed to hand off transcript for session {}: {}",
                    session.id(),
                    e
                );
            }
        }

        Ok(transcript)
    }

    /// Finalize and discard sessions idle for at least `ttl`
    pub async fn reap_idle(&self, ttl: Duration) -> Vec<FinalTranscript> {
        let candidates: Vec<Arc<StreamingSession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut reaped = Vec::new();
        for session in candidates {
            let idle = match session.idle_for().await {
                Some(idle) if idle >= ttl => idle,
                _ => continue,
            };

            warn!(
                "Reaping session {} after {:?} without activity",
                session.id(),
                idle
            );
            match self.finalize_session(&session).await {
                Ok(transcript) => reaped.push(transcript),
                Err(e) => warn!("Failed to reap session {}: {}", session.id(), e),
            }
        }

        reaped
    }

    /// Finalize every remaining session (graceful shutdown)
    pub async fn shutdown(&self) -> Vec<FinalTranscript> {
        let sessions: Vec<Arc<StreamingSession>> =
            self.sessions.read().await.values().cloned().collect();

        if !sessions.is_empty() {
            info!("Finalizing {} open session(s) before shutdown", sessions.len());
        }

        let mut finalized = Vec::new();
        for session in sessions {
            match self.finalize_session(&session).await {
                Ok(transcript) => finalized.push(transcript),
                Err(e) => warn!("Failed to finalize session {}: {}", session.id(), e),
            }
        }
        finalized
    }
}
