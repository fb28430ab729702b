mod audio;
mod capture;
mod config;
mod decode;
mod devices;
mod error;
mod messages;
mod omni;
mod services;
mod submission;

use config::Config;
use messages::{PipelineEvent, PipelineState};
use services::{Pipeline, PipelineHandle};

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("Starting omniask");

    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    // Working directory for the two transient files
    std::fs::create_dir_all(&config.work_dir)?;

    let (pipeline, mut events, state_rx) = Pipeline::spawn(config);

    println!("Press Enter to start recording, Enter again to stop and ask. Ctrl+C quits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Main event loop
    loop {
        tokio::select! {
            line = lines.next_line() => {
                if line?.is_none() {
                    break;
                }
                handle_toggle(&pipeline, &state_rx).await;
            }
            Some(event) = events.recv() => {
                handle_event(event);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    tracing::info!("omniask shutdown complete");
    Ok(())
}

async fn handle_toggle(pipeline: &PipelineHandle, state: &watch::Receiver<PipelineState>) {
    let current = *state.borrow();
    tracing::debug!("handle_toggle: current state = {current:?}");

    match current {
        PipelineState::Idle => {
            if let Err(e) = pipeline.begin().await {
                tracing::error!("Could not start recording: {e:#}");
            }
        }
        PipelineState::Recording => {
            match pipeline.end().await {
                Ok(()) => println!("Thinking..."),
                Err(e) => tracing::error!("Could not stop recording: {e:#}"),
            }
        }
        _ => {
            tracing::debug!("Round trip in flight, ignoring toggle");
        }
    }
}

fn handle_event(event: PipelineEvent) {
    match event {
        // The model narrates its answer in text ahead of the audio that
        // speaks it; both stream in as they arrive.
        PipelineEvent::TextDelta(text) | PipelineEvent::TranscriptDelta(text) => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        PipelineEvent::Completed(Ok(path)) => {
            println!();
            tracing::info!("Answer saved to {}", path.display());
            println!("Ready. Press Enter to record another question.");
        }
        PipelineEvent::Completed(Err(e)) => {
            println!();
            tracing::error!("Round trip failed: {e}");
            println!("Ready. Press Enter to try again.");
        }
    }
}
