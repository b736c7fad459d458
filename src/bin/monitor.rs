//! Standalone traffic monitor
//!
//! Counts datagrams on a multicast group without decoding them.
//!
//! Usage: `monitor [--json] [GROUP] [PORT] [IFACE]`
//!
//! `--json` prints one traffic snapshot object per line instead of a table row.

use anyhow::{Context, Result};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use partyline_intercom::{constants::*, network::TrafficMonitor};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (flags, positional): (Vec<String>, Vec<String>) =
        std::env::args().skip(1).partition(|a| a.starts_with("--"));
    let json = flags.iter().any(|f| f == "--json");
    let mut args = positional.into_iter();
    let group: Ipv4Addr = args
        .next()
        .unwrap_or_else(|| DEFAULT_GROUP.to_string())
        .parse()
        .context("invalid group address")?;
    let port: u16 = match args.next() {
        Some(p) => p.parse().context("invalid port")?,
        None => DEFAULT_PORT,
    };
    let iface = args.next();

    let mut monitor = TrafficMonitor::new();
    monitor.start(group, port, iface.as_deref())?;

    loop {
        std::thread::sleep(Duration::from_secs(1));
        let stats = monitor.stats();
        if json {
            println!("{}", serde_json::to_string(&stats)?);
            continue;
        }
        println!(
            "{}:{}  packets {:>8}  bytes {:>10}  {:>7.1} pps  {:>9.0} B/s  {}",
            group,
            port,
            stats.packets_total,
            stats.bytes_total,
            stats.pps_recent,
            stats.bps_recent,
            if stats.receiving { "receiving" } else { "idle" }
        );
    }
}
