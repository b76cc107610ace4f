//! keybridge-server entry point.
//!
//! Runs both IPC servers for a simulated device whose key matrix is driven
//! entirely through the kscan socket:
//!
//! ```text
//! main()
//!  └─ load config (+ CLI overrides)
//!  └─ --write-config: save it back to --config and exit
//!  └─ EventHub       (observer socket, `keybridge-observer` thread)
//!  └─ KscanDevice    (callback loops every key back out as a kscan event)
//!  └─ CommandServer  (kscan socket, `keybridge-kscan` thread)
//!  └─ wait for Ctrl-C, then stop both
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use keybridge_server::application::kscan_device::KscanDevice;
use keybridge_server::application::notify_events::{
    EventNotifier, HidReportSource, KeyboardState, MouseState,
};
use keybridge_server::infrastructure::network::{CommandServer, EventHub};
use keybridge_server::infrastructure::storage::config::{load_config_from, save_config_to, BridgeConfig};

/// Device-side IPC bridge: event broadcast hub and key injection server.
#[derive(Debug, Parser)]
#[command(
    name = "keybridge-server",
    about = "Event broadcast and key injection sockets for an emulated keyboard",
    version
)]
struct Cli {
    /// TOML configuration file.  Defaults apply when it is absent.
    #[arg(long, short, env = "KEYBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `observer.socket_path`.
    #[arg(long, env = "KEYBRIDGE_OBSERVER_SOCKET")]
    observer_socket: Option<PathBuf>,

    /// Overrides `kscan.socket_path`.
    #[arg(long, env = "KEYBRIDGE_KSCAN_SOCKET")]
    kscan_socket: Option<PathBuf>,

    /// Writes the effective configuration to `--config` and exits.
    #[arg(long, requires = "config")]
    write_config: bool,
}

/// HID state for a device with no HID layer: every report is empty.
struct IdleReports;

impl HidReportSource for IdleReports {
    fn keyboard(&self) -> KeyboardState {
        KeyboardState::default()
    }
    fn consumer(&self) -> Vec<u8> {
        Vec::new()
    }
    fn mouse(&self) -> MouseState {
        MouseState::default()
    }
}

fn load(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if let Some(path) = &cli.observer_socket {
        config.observer.socket_path = path.clone();
    }
    if let Some(path) = &cli.kscan_socket {
        config.kscan.socket_path = path.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    if cli.write_config {
        let path = cli.config.as_deref().context("--write-config needs --config")?;
        save_config_to(path, &config)
            .with_context(|| format!("writing config to {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("keybridge-server starting");

    let hub = Arc::new(EventHub::start(&config.observer).context("starting observer socket")?);
    let notifier = EventNotifier::new(Arc::new(IdleReports), Arc::clone(&hub) as _);

    // ── Key matrix ────────────────────────────────────────────────────────────
    let device = Arc::new(KscanDevice::new());
    let columns = config.kscan.columns;
    let started = Instant::now();
    device
        .configure(Some(Arc::new(move |row: u32, col: u32, pressed: bool| {
            let position = row.saturating_mul(columns).saturating_add(col);
            info!("key ({row}, {col}) {}", if pressed { "pressed" } else { "released" });
            let uptime_ms = started.elapsed().as_millis() as u64;
            notifier.notify_kscan_event(0, position, pressed, uptime_ms);
        })))
        .context("configuring kscan device")?;
    device.enable();

    let kscan = CommandServer::start(&config.kscan, Arc::clone(&device))
        .context("starting kscan socket")?;

    info!("keybridge-server ready.  Press Ctrl-C to exit.");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    device.disable();
    kscan.stop();
    hub.stop();

    info!("keybridge-server stopped");
    Ok(())
}
