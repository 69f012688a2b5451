//! uim-daemon binary.

use anyhow::Context;
use clap::Parser;
use tokio::task::LocalSet;
use uim_daemon::cli::{self, DaemonArgs};

fn main() -> anyhow::Result<()> {
    let args = DaemonArgs::parse();
    cli::init_tracing();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the runtime")?;

    LocalSet::new().block_on(&runtime, cli::run(args))
}
