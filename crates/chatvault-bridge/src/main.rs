//! # chatvault-bridge
//!
//! Runs the archive next to a protocol client. Events arrive as
//! newline-delimited JSON on stdin; each line is one [`InboundEvent`].
//! Ctrl+C (or the end of input) drains pending media transfers and exits.

use anyhow::Context;
use chatvault_bridge::{Bridge, BridgeConfig, InboundEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,chatvault_store=info,chatvault_media=debug,chatvault_bridge=debug")
        }))
        .init();

    info!("Starting chatvault bridge v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration and open the stores
    // -----------------------------------------------------------------------
    let config = BridgeConfig::from_env();
    info!(?config, "Loaded configuration");

    let bridge = Bridge::open(config).context("failed to open the encrypted store")?;

    // -----------------------------------------------------------------------
    // 3. Ingest events until Ctrl+C or end of input
    // -----------------------------------------------------------------------
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    // Archive writes block the calling thread.
                    Ok(Some(line)) => tokio::task::block_in_place(|| ingest_line(&bridge, &line)),
                    Ok(None) => {
                        info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read input");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    // -----------------------------------------------------------------------
    // 4. Drain queued transfers
    // -----------------------------------------------------------------------
    bridge.shutdown().await;
    Ok(())
}

fn ingest_line(bridge: &Bridge, line: &str) {
    let event = match InboundEvent::from_json(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Skipping malformed event");
            return;
        }
    };
    if let Err(e) = bridge.ingest(&event) {
        error!(error = %e, "Failed to store event");
    }
}
