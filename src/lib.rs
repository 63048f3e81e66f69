pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod registry;
pub mod session;
pub mod transport;

pub use config::Config;
pub use error::SessionError;
pub use http::{create_router, AppState};
pub use nats::NatsTransport;
pub use registry::{spawn_reaper, SessionRegistry, TranscriptSink};
pub use session::{
    DrainOutcome, FinalTranscript, IngestReceipt, LinkPhase, SessionDiagnostics, SessionPolicy,
    SessionStatus, StreamingSession,
};
pub use transport::{
    AudioEncoding, AudioFormatHint, MemoryTransport, RecognitionConfig, RecognitionTransport,
    TransportError, TransportEvent,
};
