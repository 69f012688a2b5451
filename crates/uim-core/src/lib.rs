//! Core types shared by the user identification manager crates.
//!
//! This crate holds the value types that flow through the whole system
//! ([`IdentifiedUser`], [`SeatId`]), the identifier encoding helpers, the
//! daemon [`Configuration`] and the constants the other crates agree on.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::Configuration;
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
