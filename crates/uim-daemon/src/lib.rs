//! User identification manager daemon.
//!
//! Collects identifications from all sources and serves them to clients on
//! a Unix socket. See [`Daemon`] for how the parts are wired.

pub mod cli;
pub mod daemon;

pub use daemon::{Control, Daemon, GroupBackend};
