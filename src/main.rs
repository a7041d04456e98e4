use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use convo_capture::{
    ChunkStatus, Config, CpalBackend, EngineConfig, EngineEvent, HttpApi, SessionEngine,
};

#[derive(Parser, Debug)]
#[command(
    name = "convo-capture",
    about = "Record a conversation in fixed-duration chunks and stream them to a transcription service"
)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config/convo-capture")]
    config: String,

    /// Override the chunk interval in seconds
    #[arg(long)]
    interval: Option<u32>,

    /// Override the input device name
    #[arg(long)]
    device: Option<String>,

    /// Override the transcription language
    #[arg(long)]
    language: Option<String>,

    /// Session title
    #[arg(long)]
    title: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(interval) = args.interval {
        cfg.session.chunk_interval_secs = interval;
    }
    if let Some(device) = args.device {
        cfg.audio.device = Some(device);
    }
    if let Some(language) = args.language {
        cfg.session.language = language;
    }
    if let Some(title) = args.title {
        cfg.session.title = Some(title);
    }

    info!("convo-capture v0.1.0");
    info!("Transcription service: {}", cfg.service.base_url);
    info!(
        "Chunk interval: {}s, language: {}",
        cfg.session.chunk_interval_secs, cfg.session.language
    );

    let api = Arc::new(HttpApi::new(&cfg.service.base_url)?);
    let backend = Box::new(CpalBackend::new(cfg.audio.clone()));
    let engine_config = EngineConfig::from_config(&cfg);

    let (engine, handle, mut events) = SessionEngine::new(engine_config, api, backend);
    let engine_task = tokio::spawn(engine.run());

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::SessionStateChanged(state) => {
                    info!(?state, "Session state changed");
                }
                EngineEvent::ChunkUpdated(chunk) => match chunk.status {
                    ChunkStatus::Completed => {
                        if let Some(text) = &chunk.transcript_text {
                            println!("[chunk {}] {}", chunk.index, text.trim());
                        }
                    }
                    ChunkStatus::Failed => {
                        warn!(
                            index = chunk.index,
                            error = chunk.error_message.as_deref().unwrap_or("unknown"),
                            "Chunk failed; the audio is kept server-side for a retry"
                        );
                    }
                    status => {
                        info!(index = chunk.index, ?status, "Chunk update");
                    }
                },
                EngineEvent::Error { kind, message } => {
                    warn!(kind, "{}", message);
                }
            }
        }
    });

    handle.start().await;
    info!("Recording. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Stopping recording");
    handle.stop().await;

    // Dropping the handle lets the engine wind down once the final chunks
    // are uploaded and transcribed.
    drop(handle);
    engine_task.await?;
    printer.await?;

    Ok(())
}
