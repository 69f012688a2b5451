//! Service transport of the user identification manager.
//!
//! The daemon and its clients exchange newline-delimited JSON messages over
//! a Unix domain socket.
//!
//! # Components
//!
//! - [`message`]: `Request` and `Response` types
//! - [`codec`]: JSON-lines framing for `tokio_util::codec::Framed`
//! - [`UnixServer`]: daemon side, serves a [`ManagerBackend`]
//! - [`UnixClient`]: client side, used by the `uim` tool

mod client;
pub mod codec;
mod error;
pub mod message;
mod server;

pub use client::{Monitor, SourcesStatus, UnixClient, UnixClientConfig};
pub use codec::{ClientCodec, JsonLinesCodec, ServerCodec};
pub use error::{ProtocolError, Result};
pub use message::{Request, Response};
pub use server::{EventPublisher, ManagerBackend, UnixServer};
