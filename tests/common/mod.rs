#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use wingman_transcribe::{
    MemoryTransport, RecognitionConfig, SessionPolicy, SessionRegistry, StreamingSession,
};

pub const OWNER: &str = "candidate-42";

/// Short timings so drains finish quickly
pub fn fast_policy() -> SessionPolicy {
    SessionPolicy {
        max_reconnects: 3,
        quiet_period: Duration::from_millis(150),
        finalize_timeout: Duration::from_secs(2),
        max_chunk_bytes: 1024,
        idle_ttl: Duration::from_secs(60),
    }
}

pub fn registry(transport: &MemoryTransport, policy: SessionPolicy) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(
        Arc::new(transport.clone()),
        policy,
        RecognitionConfig::default(),
    ))
}

pub async fn open_session(
    transport: &MemoryTransport,
    id: &str,
    policy: SessionPolicy,
) -> StreamingSession {
    StreamingSession::open(
        id.to_string(),
        OWNER.to_string(),
        RecognitionConfig::default(),
        policy,
        Arc::new(transport.clone()),
    )
    .await
    .expect("session should open")
}

/// Wait until the session has applied at least `events` transport events
pub async fn settle(session: &StreamingSession, events: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let seen = session.status().await.diagnostics.event_count;
        if seen >= events {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "only {} of {} events applied",
            seen,
            events
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
