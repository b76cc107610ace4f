//! keybridge-client entry point.
//!
//! ```text
//! keybridge-client watch [--socket PATH]
//!  └─ EventWatcher::connect()
//!  └─ print every event until Ctrl-C or the bridge disconnects
//!
//! keybridge-client send [--socket PATH] [--hold-ms N] [--interval-ms N] KEY...
//!  └─ KeySender::connect()
//!  └─ for each KEY: press, hold, release, wait
//! ```
//!
//! `KEY` is a linear matrix position (`5`) or a `ROW:COL` pair (`1:3`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use keybridge_core::KeyAddress;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keybridge_client::application::format_event::format_event;
use keybridge_client::application::key_target::{describe, parse_key_target};
use keybridge_client::infrastructure::network::{
    ClientError, EventWatcher, KeySender, DEFAULT_EVENTS_SOCKET, DEFAULT_KSCAN_SOCKET,
};

/// Watch events from, and inject keys into, a running keybridge.
#[derive(Debug, Parser)]
#[command(name = "keybridge-client", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Subscribe to the observer socket and print every event.
    Watch {
        #[arg(long, env = "KEYBRIDGE_OBSERVER_SOCKET", default_value = DEFAULT_EVENTS_SOCKET)]
        socket: PathBuf,
    },
    /// Press and release each key in turn.
    Send {
        #[arg(long, env = "KEYBRIDGE_KSCAN_SOCKET", default_value = DEFAULT_KSCAN_SOCKET)]
        socket: PathBuf,
        /// How long each key is held.
        #[arg(long, default_value_t = 50)]
        hold_ms: u64,
        /// Pause after each release.
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
        /// Linear positions or ROW:COL pairs.
        #[arg(required = true, value_parser = parse_key_target)]
        keys: Vec<KeyAddress>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so event lines on stdout stay clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match Cli::parse().command {
        Command::Watch { socket } => watch(socket).await,
        Command::Send {
            socket,
            hold_ms,
            interval_ms,
            keys,
        } => {
            let hold = Duration::from_millis(hold_ms);
            let interval = Duration::from_millis(interval_ms);
            tokio::task::spawn_blocking(move || send(socket, &keys, hold, interval))
                .await
                .context("sender task failed")?
        }
    }
}

async fn watch(socket: PathBuf) -> anyhow::Result<()> {
    let mut watcher = EventWatcher::connect(&socket)
        .await
        .context("is the bridge running?")?;
    println!("Watching {} (Ctrl-C to stop)", socket.display());

    loop {
        tokio::select! {
            result = watcher.next_event() => match result {
                Ok(event) => println!("{}", format_event(&event)),
                Err(e) if e.is_closed() => {
                    info!("bridge closed the connection");
                    return Ok(());
                }
                Err(e @ ClientError::Decode(_)) => {
                    warn!("{e}");
                }
                Err(e) => return Err(e).context("reading events"),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn send(
    socket: PathBuf,
    keys: &[KeyAddress],
    hold: Duration,
    interval: Duration,
) -> anyhow::Result<()> {
    let mut sender = KeySender::connect(&socket).context("is the bridge running?")?;
    println!("Connected to {}. Sending {} key(s).", socket.display(), keys.len());

    for address in keys {
        println!("  TAP     {}", describe(address));
        sender
            .tap(*address, hold)
            .with_context(|| format!("sending {}", describe(address)))?;
        std::thread::sleep(interval);
    }
    println!("Done.");
    Ok(())
}
