//! `uim`: inspect a running user identification manager.
//!
//! # Usage
//!
//! ```text
//! uim --identified-users
//! uim --sources --monitor
//! uim --socket /tmp/uim.sock -i
//! ```

mod output;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uim_core::constants::DEFAULT_SOCKET_PATH;
use uim_network::{UnixClient, UnixClientConfig};

#[derive(Parser, Debug)]
#[command(name = "uim", version, about = "Inspect the user identification manager")]
struct Args {
    /// Print recently identified users
    #[arg(short, long)]
    identified_users: bool,

    /// Print enabled and disabled identification sources
    #[arg(short, long)]
    sources: bool,

    /// Monitor user identification events until Ctrl-C
    #[arg(short, long)]
    monitor: bool,

    /// Socket of the daemon
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Request timeout in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 3000)]
    timeout: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = UnixClientConfig {
        socket_path: args.socket.clone(),
        timeout: Duration::from_millis(args.timeout),
    };
    debug!("Connecting to {}", args.socket.display());
    let mut client = UnixClient::connect(config)
        .await
        .with_context(|| format!("failed to connect to {}", args.socket.display()))?;

    let mut stdout = std::io::stdout();

    if args.identified_users {
        let users = client
            .identified_users()
            .await
            .context("failed to get identified users")?;
        output::write_identified_users(&mut stdout, &users)?;
    }

    if args.sources {
        let sources = client.sources().await.context("failed to get sources")?;
        output::write_sources(&mut stdout, &sources)?;
    }

    if args.monitor {
        monitor_until_ctrl_c(client, &mut stdout).await?;
    }

    Ok(())
}

async fn monitor_until_ctrl_c(client: UnixClient, out: &mut impl Write) -> Result<()> {
    let mut monitor = client
        .monitor()
        .await
        .context("failed to monitor identifications")?;
    debug!("Monitoring user identifications");

    writeln!(out, "Waiting for users to be identified, press Ctrl-C to quit.")?;
    out.flush()?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                return result.context("failed to setup Ctrl-C handler");
            }
            user = monitor.next_user() => match user.context("lost connection to the daemon")? {
                Some(user) => {
                    output::write_identified_user(out, &user)?;
                    out.flush()?;
                }
                None => {
                    debug!("Daemon closed the monitor connection");
                    return Ok(());
                }
            },
        }
    }
}
