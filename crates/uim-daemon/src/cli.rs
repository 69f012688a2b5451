//! Command line entry point of the daemon.

use crate::daemon::{Control, Daemon};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uim_core::Configuration;
use uim_core::constants::DEFAULT_CONFIG_FILE;

/// User identification manager daemon.
#[derive(Parser, Debug, Clone)]
#[command(name = "uim-daemon", version, about = "User identification manager daemon")]
pub struct DaemonArgs {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run the daemon until SIGINT or SIGTERM.
///
/// Must run inside a `LocalSet`.
pub async fn run(args: DaemonArgs) -> anyhow::Result<()> {
    let config = Configuration::from_file(&args.config);
    info!(
        "Starting uim-daemon {} with {}",
        uim_core::VERSION,
        config.config_file.display()
    );

    let mut daemon =
        Daemon::new(config, card_readers()).context("failed to start the daemon")?;

    let (control, commands) = mpsc::channel(4);
    tokio::task::spawn_local(forward_signals(control));

    daemon.run(commands).await
}

#[cfg(feature = "hardware-pcsc")]
fn card_readers() -> uim_hardware::pcsc::PcscSubsystem {
    uim_hardware::pcsc::PcscSubsystem
}

#[cfg(not(feature = "hardware-pcsc"))]
fn card_readers() -> uim_hardware::UnavailableSubsystem {
    uim_hardware::UnavailableSubsystem
}

/// Translate SIGINT/SIGTERM into `Quit` and SIGHUP into `Reload`.
async fn forward_signals(control: mpsc::Sender<Control>) {
    let (mut interrupt, mut terminate, mut hangup) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(interrupt), Ok(terminate), Ok(hangup)) => (interrupt, terminate, hangup),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            warn!("Failed to install signal handlers: {}", e);
            // Keep the sender alive, dropping it would stop the daemon.
            std::future::pending::<()>().await;
            return;
        }
    };

    loop {
        let command = tokio::select! {
            _ = interrupt.recv() => Control::Quit,
            _ = terminate.recv() => Control::Quit,
            _ = hangup.recv() => Control::Reload,
        };

        info!(?command, "Signal received");

        if control.send(command).await.is_err() || command == Control::Quit {
            return;
        }
    }
}
