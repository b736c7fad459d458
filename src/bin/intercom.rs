//! Intercom node
//!
//! Loads the config, serves the control API and optionally starts transmit
//! and receive right away.
//!
//! Usage: `intercom [--config PATH] [--autostart]`

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use partyline_intercom::{config::AppConfig, intercom::Intercom, ui::WebServer};

struct Args {
    config: Option<PathBuf>,
    autostart: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        autostart: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = Some(it.next().context("--config needs a path")?.into()),
            "--autostart" => args.autostart = true,
            other => bail!("unknown argument {:?}", other),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting party-line intercom");

    let args = parse_args()?;
    let path = args.config.unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&path).with_context(|| format!("loading {}", path.display()))?;
    tracing::info!("Config: {}", path.display());

    let node = Arc::new(Intercom::new(config.clone(), path));

    if args.autostart {
        let starter = node.clone();
        match tokio::task::spawn_blocking(move || starter.restart()).await? {
            Ok(()) => tracing::info!("Transmit and receive started"),
            Err(e) => tracing::warn!("Autostart failed: {}", e),
        }
    }

    let mut server = WebServer::new(config.ui.clone(), node.clone()).start_background();

    let mut stats_timer = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            served = &mut server => {
                served??;
                break;
            }
            _ = stats_timer.tick() => {
                let status = node.status();
                if let Some(tx) = &status.tx {
                    tracing::info!(
                        "TX {}: {} packets, {:.1} KB sent, {} errors",
                        tx.source,
                        tx.packets_sent,
                        tx.bytes_sent as f64 / 1024.0,
                        tx.send_errors
                    );
                }
                if status.rx_running {
                    let peers = node.peers();
                    let traffic = node.metrics();
                    tracing::info!(
                        "RX: {} talkers, mix {}, {:.0} pps",
                        peers.peers.len(),
                        peers
                            .mix_level_db
                            .map(|db| format!("{:.1} dBFS", db))
                            .unwrap_or_else(|| "--".to_string()),
                        traffic.pps_recent
                    );
                }
                if let Some(err) = &status.rx_error {
                    tracing::warn!("RX stopped: {}", err);
                }
            }
        }
    }

    tokio::task::spawn_blocking(move || node.stop_all()).await?;
    Ok(())
}
