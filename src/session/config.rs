use std::time::Duration;

/// Retry, draining and housekeeping policy shared by every session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPolicy {
    /// Reconnections allowed per session before it is exhausted
    pub max_reconnects: u32,

    /// Inactivity after which a draining session is considered complete
    /// Default: 2.5 seconds
    pub quiet_period: Duration,

    /// Hard ceiling on draining, measured from the finalize call
    /// Default: 20 seconds
    pub finalize_timeout: Duration,

    /// Chunks above this size are accepted with a warning
    pub max_chunk_bytes: usize,

    /// Sessions idle for longer than this are reaped
    pub idle_ttl: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_reconnects: 3,
            quiet_period: Duration::from_millis(2500),
            finalize_timeout: Duration::from_secs(20),
            max_chunk_bytes: 256 * 1024,
            idle_ttl: Duration::from_secs(600),
        }
    }
}
