//! Main Entrypoint for the Tutor Arbiter
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Starting the arbiter runtime with channel-backed collaborators.
//! 3. Replaying JSON-lines events from stdin as a producer.
//! 4. Writing every outbound command to stdout as a JSON line.
//! 5. Shutting down on Ctrl+C or at the end of input.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tutor_arbiter::{
    config::Config, outbound::ChannelCollaborators, queues::QueueClosed, runtime::TutorRuntime,
};
use tutor_core::events::Event;

/// Time given to the arbiter to drain queued events after stdin ends.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    // stdout carries commands, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(robot_id = %config.robot_id, "Configuration loaded. Starting arbiter...");

    // --- 3. Outbound Commands ---
    let (outbound, mut commands) = ChannelCollaborators::channel(config.queue_capacity);
    let printer = tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            match serde_json::to_string(&command) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "Failed to serialize command"),
            }
        }
    });

    // --- 4. Runtime and stdin Producer ---
    let mut runtime = TutorRuntime::start(&config, Arc::new(outbound));
    let (eof_tx, eof_rx) = tokio::sync::oneshot::channel::<()>();
    runtime.spawn_producer("stdin", |producers, cancel| async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(&line) {
                Ok(event) => producers.submit(event).await?,
                Err(e) => warn!(error = %e, "Skipping malformed event"),
            }
        }
        let _ = eof_tx.send(());
        Ok::<(), QueueClosed>(())
    });

    // --- 5. Wait for Ctrl+C or End of Input ---
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal. Shutting down gracefully...");
        }
        _ = eof_rx => {
            info!("Input finished. Draining queued events...");
            tokio::time::sleep(DRAIN_GRACE.max(config.poll_interval * 2)).await;
        }
    }

    let registry = runtime
        .shutdown()
        .await
        .context("Arbiter task did not shut down cleanly")?;
    info!(
        open_sessions = registry.active_sessions(),
        closed_sessions = registry.closed_sessions(),
        "Session summary"
    );

    // The arbiter owned the last command sender, so the printer ends here.
    printer.await.context("Command printer failed")?;
    info!("Arbiter has shut down.");
    Ok(())
}
