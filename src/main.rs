use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wingman_transcribe::{
    create_router, spawn_reaper, AppState, Config, NatsTransport, SessionRegistry,
};

#[derive(Debug, Parser)]
#[command(name = "wingman-transcribe", about = "Streaming interview transcription service")]
struct Cli {
    /// Config file path (extension optional)
    #[arg(short, long, default_value = "config/wingman-transcribe")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Override the NATS server URL
    #[arg(long)]
    nats_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::load(&cli.config)?;
    if let Some(bind) = cli.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = cli.port {
        cfg.service.http.port = port;
    }
    if let Some(url) = cli.nats_url {
        cfg.nats.url = url;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .init();

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(
        "HTTP server will bind to {}:{}",
        cfg.service.http.bind, cfg.service.http.port
    );

    let transport = Arc::new(NatsTransport::connect(&cfg.nats.url).await?);

    let mut registry = SessionRegistry::new(
        transport.clone(),
        cfg.session.to_policy(),
        cfg.recognition.to_recognition_config(),
    );
    if cfg.nats.publish_transcripts {
        registry = registry.with_transcript_sink(transport.clone());
    }
    let registry = Arc::new(registry);

    let reaper = spawn_reaper(Arc::clone(&registry), cfg.session.reaper_interval());

    let app = create_router(
        AppState::new(Arc::clone(&registry)),
        cfg.service.http.max_body_bytes,
    );

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    reaper.abort();
    let finalized = registry.shutdown().await;
    info!("Shutdown complete ({} session(s) finalized)", finalized.len());

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
