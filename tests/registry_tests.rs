mod common;

use common::{fast_policy, registry, settle, OWNER};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use wingman_transcribe::{
    spawn_reaper, AudioEncoding, AudioFormatHint, FinalTranscript, MemoryTransport,
    RecognitionConfig, SessionError, SessionPolicy, SessionRegistry, TranscriptSink, TransportError,
};

#[derive(Default)]
struct CollectingSink {
    delivered: Mutex<Vec<FinalTranscript>>,
}

#[async_trait::async_trait]
impl TranscriptSink for CollectingSink {
    async fn deliver(&self, transcript: &FinalTranscript) -> anyhow::Result<()> {
        self.delivered.lock().await.push(transcript.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_create_get_remove() {
    let transport = MemoryTransport::new();
    let registry = registry(&transport, fast_policy());

    let session = registry
        .create("interview-1", OWNER, &AudioFormatHint::default())
        .await
        .unwrap();
    assert_eq!(session.id(), "interview-1");
    assert_eq!(session.owner(), OWNER);
    assert_eq!(registry.len().await, 1);
    assert_eq!(transport.open_count(), 1);

    let found = registry.get("interview-1").await.unwrap();
    assert!(Arc::ptr_eq(&found, &session));
    assert!(format!("{:?}", found).contains("interview-1"));

    assert!(registry.remove("interview-1").await.is_some());
    assert!(registry.is_empty().await);
    assert!(matches!(
        registry.get("interview-1").await,
        Err(SessionError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_remove_tears_down_stream() {
    let transport = MemoryTransport::new();
    let registry = registry(&transport, fast_policy());

    let session = registry
        .create("dropped", OWNER, &AudioFormatHint::default())
        .await
        .unwrap();
    let stream = transport.stream(0).unwrap();
    assert!(stream.emit_interim("still listening"));
    settle(&session, 1).await;

    let removed = registry.remove("dropped").await.unwrap();
    assert!(Arc::ptr_eq(&removed, &session));
    assert!(stream.is_closed());
    assert!(matches!(
        session.ingest(&[1]).await,
        Err(SessionError::TransportClosed(_))
    ));
    drop(removed);
    drop(session);

    // The event consumer is gone once the pump is aborted
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while stream.emit_interim("anyone there") {
        assert!(tokio::time::Instant::now() < deadline, "event pump still running");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(registry.remove("dropped").await.is_none());
}

#[tokio::test]
async fn test_duplicate_id_rejected() {
    let transport = MemoryTransport::new();
    let registry = registry(&transport, fast_policy());

    registry
        .create("dup", OWNER, &AudioFormatHint::default())
        .await
        .unwrap();
    let err = registry
        .create("dup", "someone-else", &AudioFormatHint::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::AlreadyExists(ref id) if id == "dup"));
    assert_eq!(transport.open_count(), 1);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_concurrent_create_registers_once() {
    let transport = MemoryTransport::new();
    let registry = registry(&transport, fast_policy());
    let hint = AudioFormatHint::default();

    let (a, b) = tokio::join!(
        registry.create("race", OWNER, &hint),
        registry.create("race", OWNER, &hint)
    );

    let created = [a.is_ok(), b.is_ok()];
    assert_eq!(created.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(registry.len().await, 1);

    // A losing stream, if one was opened, is torn down
    let closed = (0..transport.open_count())
        .filter(|i| transport.stream(*i).unwrap().is_closed())
        .count();
    assert_eq!(closed, transport.open_count() - 1);
}

#[tokio::test]
async fn test_unknown_session_operations() {
    let transport = MemoryTransport::new();
    let registry = registry(&transport, fast_policy());

    assert!(matches!(
        registry.ingest("missing", OWNER, &[1, 2]).await,
        Err(SessionError::NotFound(_))
    ));
    assert!(matches!(
        registry.finalize("missing", OWNER).await,
        Err(SessionError::NotFound(_))
    ));
    assert!(matches!(
        registry.status("missing", OWNER).await,
        Err(SessionError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_owner_is_checked_on_every_operation() {
    let transport = MemoryTransport::new();
    let registry = registry(&transport, fast_policy());
    registry
        .create("private", OWNER, &AudioFormatHint::default())
        .await
        .unwrap();

    assert!(matches!(
        registry.ingest("private", "intruder", &[1]).await,
        Err(SessionError::Forbidden(_))
    ));
    assert!(matches!(
        registry.status("private", "intruder").await,
        Err(SessionError::Forbidden(_))
    ));
    assert!(matches!(
        registry.finalize("private", "intruder").await,
        Err(SessionError::Forbidden(_))
    ));

    assert!(transport.stream(0).unwrap().frames().is_empty());
    assert!(registry.contains("private").await);
}

#[tokio::test]
async fn test_format_hint_shapes_stream_config() {
    let transport = MemoryTransport::new();
    let defaults = RecognitionConfig {
        boost_terms: vec!["STAR method".to_string()],
        ..Default::default()
    };
    let registry = SessionRegistry::new(Arc::new(transport.clone()), fast_policy(), defaults);

    let hint = AudioFormatHint {
        encoding: Some(AudioEncoding::Linear16),
        sample_rate_hz: Some(48000),
        language_code: None,
        boost_terms: vec!["Kubernetes".to_string()],
    };
    let session = registry.create("hinted", OWNER, &hint).await.unwrap();

    let config = transport.stream(0).unwrap().config().clone();
    assert_eq!(config.encoding, AudioEncoding::Linear16);
    assert_eq!(config.sample_rate_hz, Some(48000));
    assert_eq!(config.language_code, "en-US");
    assert_eq!(config.boost_terms, vec!["STAR method", "Kubernetes"]);
    assert_eq!(session.recognition_config(), &config);
}

#[tokio::test]
async fn test_finalize_unregisters_and_hands_off() {
    let transport = MemoryTransport::new();
    let sink = Arc::new(CollectingSink::default());
    let registry = Arc::new(
        SessionRegistry::new(
            Arc::new(transport.clone()),
            fast_policy(),
            RecognitionConfig::default(),
        )
        .with_transcript_sink(sink.clone()),
    );

    let session = registry
        .create("handoff", OWNER, &AudioFormatHint::default())
        .await
        .unwrap();
    registry.ingest("handoff", OWNER, &[0; 64]).await.unwrap();
    transport
        .stream(0)
        .unwrap()
        .emit_final("Where do you see yourself in five years?", 0.97);
    settle(&session, 1).await;

    let transcript = registry.finalize("handoff", OWNER).await.unwrap();
    assert_eq!(
        transcript.transcript,
        "Where do you see yourself in five years?"
    );
    assert_eq!(transcript.session_id, "handoff");
    assert_eq!(transcript.owner, OWNER);

    assert!(!registry.contains("handoff").await);
    assert!(matches!(
        registry.finalize("handoff", OWNER).await,
        Err(SessionError::NotFound(_))
    ));

    let delivered = sink.delivered.lock().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].transcript, transcript.transcript);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let transport = MemoryTransport::new();
    let registry = registry(&transport, fast_policy());

    let a = registry
        .create("a", OWNER, &AudioFormatHint::default())
        .await
        .unwrap();
    let b = registry
        .create("b", "other-candidate", &AudioFormatHint::default())
        .await
        .unwrap();
    let stream_a = transport.stream(0).unwrap();
    let stream_b = transport.stream(1).unwrap();

    registry.ingest("a", OWNER, &[0xa1]).await.unwrap();
    registry.ingest("b", "other-candidate", &[0xb1]).await.unwrap();
    stream_a.emit_final("Answer from A.", 0.9);
    stream_b.emit_interim("answer from b in progress");
    registry.ingest("a", OWNER, &[0xa2]).await.unwrap();

    // A times out and reconnects; B is untouched
    stream_a.emit_error(TransportError::DeadlineExceeded("a".into()));
    settle(&a, 2).await;
    settle(&b, 1).await;
    registry.ingest("a", OWNER, &[0xa3]).await.unwrap();
    registry.ingest("b", "other-candidate", &[0xb2]).await.unwrap();

    let (final_a, status_b) = tokio::join!(
        registry.finalize("a", OWNER),
        registry.status("b", "other-candidate")
    );
    let final_a = final_a.unwrap();
    let status_b = status_b.unwrap();

    assert_eq!(final_a.transcript, "Answer from A.");
    assert_eq!(final_a.diagnostics.reconnect_count, 1);
    assert_eq!(final_a.diagnostics.bytes_sent, 3);

    assert_eq!(status_b.partial_transcript, "answer from b in progress");
    assert_eq!(status_b.diagnostics.reconnect_count, 0);
    assert_eq!(status_b.diagnostics.bytes_sent, 2);
    assert_eq!(stream_b.frames(), vec![vec![0xb1], vec![0xb2]]);
    assert!(!stream_b.is_closed());

    assert!(registry.contains("b").await);
    assert!(!registry.contains("a").await);
}

#[tokio::test]
async fn test_reaper_finalizes_idle_sessions() {
    let transport = MemoryTransport::new();
    let sink = Arc::new(CollectingSink::default());
    let policy = SessionPolicy {
        idle_ttl: Duration::from_millis(100),
        quiet_period: Duration::from_millis(20),
        ..fast_policy()
    };
    let registry = Arc::new(
        SessionRegistry::new(
            Arc::new(transport.clone()),
            policy,
            RecognitionConfig::default(),
        )
        .with_transcript_sink(sink.clone()),
    );

    let idle = registry
        .create("abandoned", OWNER, &AudioFormatHint::default())
        .await
        .unwrap();
    transport.stream(0).unwrap().emit_interim("I would say my weakness");
    settle(&idle, 1).await;

    // Nothing is old enough yet
    assert!(registry.reap_idle(Duration::from_secs(60)).await.is_empty());

    let reaper = spawn_reaper(Arc::clone(&registry), Duration::from_millis(25));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while registry.contains("abandoned").await {
        assert!(tokio::time::Instant::now() < deadline, "session never reaped");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    reaper.abort();

    let delivered = sink.delivered.lock().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].transcript, "I would say my weakness");
    assert!(transport.stream(0).unwrap().is_closed());
}

#[tokio::test]
async fn test_shutdown_finalizes_everything() {
    let transport = MemoryTransport::new();
    let registry = registry(
        &transport,
        SessionPolicy {
            quiet_period: Duration::from_millis(20),
            ..fast_policy()
        },
    );

    for id in ["one", "two", "three"] {
        registry
            .create(id, OWNER, &AudioFormatHint::default())
            .await
            .unwrap();
    }

    let finalized = registry.shutdown().await;
    assert_eq!(finalized.len(), 3);
    assert!(registry.is_empty().await);
    assert!((0..3).all(|i| transport.stream(i).unwrap().is_closed()));
}
