use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::session::SessionPolicy;
use crate::transport::{AudioEncoding, RecognitionConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub nats: NatsConfig,
    pub recognition: RecognitionDefaults,
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "wingman-transcribe".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
    /// Hard cap on a single request body (audio chunk uploads included)
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
    /// Publish finalized transcripts on `transcripts.final.<session_id>`
    pub publish_transcripts: bool,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            publish_transcripts: true,
        }
    }
}

/// Service-wide recognition defaults, overlaid per session by the caller's format hint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionDefaults {
    pub language_code: String,
    pub encoding: AudioEncoding,
    pub sample_rate_hz: Option<u32>,
    pub model: String,
    pub enable_automatic_punctuation: bool,
    pub boost_terms: Vec<String>,
    pub boost: f32,
}

impl Default for RecognitionDefaults {
    fn default() -> Self {
        let base = RecognitionConfig::default();
        Self {
            language_code: base.language_code,
            encoding: base.encoding,
            sample_rate_hz: base.sample_rate_hz,
            model: base.model,
            enable_automatic_punctuation: base.enable_automatic_punctuation,
            boost_terms: base.boost_terms,
            boost: base.boost,
        }
    }
}

impl RecognitionDefaults {
    pub fn to_recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig {
            language_code: self.language_code.clone(),
            encoding: self.encoding,
            sample_rate_hz: self.sample_rate_hz,
            model: self.model.clone(),
            enable_automatic_punctuation: self.enable_automatic_punctuation,
            interim_results: true,
            boost_terms: self.boost_terms.clone(),
            boost: self.boost,
        }
    }
}

/// Session timing and retry settings, in file-friendly units
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_reconnects: u32,
    pub quiet_period_ms: u64,
    pub finalize_timeout_ms: u64,
    pub max_chunk_bytes: usize,
    pub idle_ttl_secs: u64,
    pub reaper_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let policy = SessionPolicy::default();
        Self {
            max_reconnects: policy.max_reconnects,
            quiet_period_ms: policy.quiet_period.as_millis() as u64,
            finalize_timeout_ms: policy.finalize_timeout.as_millis() as u64,
            max_chunk_bytes: policy.max_chunk_bytes,
            idle_ttl_secs: policy.idle_ttl.as_secs(),
            reaper_interval_secs: 30,
        }
    }
}

impl SessionSettings {
    pub fn to_policy(&self) -> SessionPolicy {
        SessionPolicy {
            max_reconnects: self.max_reconnects,
            quiet_period: Duration::from_millis(self.quiet_period_ms),
            finalize_timeout: Duration::from_millis(self.finalize_timeout_ms),
            max_chunk_bytes: self.max_chunk_bytes,
            idle_ttl: Duration::from_secs(self.idle_ttl_secs),
        }
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from an optional file plus `WINGMAN__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("WINGMAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load("/nonexistent/wingman-transcribe").unwrap();
        assert_eq!(cfg.service.http.port, 8080);
        assert_eq!(cfg.session.max_reconnects, 3);
        assert_eq!(cfg.session.quiet_period_ms, 2500);
        assert_eq!(cfg.session.finalize_timeout_ms, 20_000);
        assert_eq!(cfg.recognition.language_code, "en-US");
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("settings.toml")).unwrap();
        writeln!(
            file,
            r#"
[service.http]
port = 9090

[recognition]
language_code = "en-GB"
encoding = "linear16"
sample_rate_hz = 48000
boost_terms = ["STAR method", "stakeholder"]

[session]
max_reconnects = 5
quiet_period_ms = 1000
"#
        )
        .unwrap();

        drop(file);

        let path = dir.path().join("settings");
        let cfg = Config::load(path.to_str().unwrap()).unwrap();

        assert_eq!(cfg.service.http.port, 9090);
        assert_eq!(cfg.service.http.bind, "0.0.0.0");
        assert_eq!(cfg.recognition.encoding, AudioEncoding::Linear16);
        assert_eq!(cfg.recognition.sample_rate_hz, Some(48000));
        assert_eq!(cfg.recognition.boost_terms.len(), 2);

        let policy = cfg.session.to_policy();
        assert_eq!(policy.max_reconnects, 5);
        assert_eq!(policy.quiet_period, Duration::from_millis(1000));
        assert_eq!(policy.finalize_timeout, Duration::from_secs(20));
    }
}
