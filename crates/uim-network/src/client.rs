//! Unix socket client for the identification manager.
//!
//! # Example Usage
//!
//! ```no_run
//! use uim_network::{UnixClient, UnixClientConfig};
//!
//! # async fn example() -> uim_network::Result<()> {
//! let mut client = UnixClient::connect(UnixClientConfig::default()).await?;
//!
//! for user in client.identified_users().await? {
//!     println!("{user}");
//! }
//!
//! let mut monitor = client.monitor().await?;
//! while let Some(user) = monitor.next_user().await? {
//!     println!("{user}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Requests time out after the configured timeout. Waiting for monitored
//! notifications never times out.

use crate::codec::ClientCodec;
use crate::error::{ProtocolError, Result};
use crate::message::{Request, Response};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tracing::{debug, trace};
use uim_core::IdentifiedUser;
use uim_core::constants::DEFAULT_SOCKET_PATH;

/// Configuration for the Unix socket client
#[derive(Debug, Clone)]
pub struct UnixClientConfig {
    /// Socket the daemon listens on
    pub socket_path: PathBuf,

    /// Timeout for connect and for every request
    pub timeout: Duration,
}

impl Default for UnixClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            timeout: Duration::from_millis(3000),
        }
    }
}

/// Enabled and disabled source names reported by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcesStatus {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

/// Connection to the daemon.
pub struct UnixClient {
    framed: Framed<UnixStream, ClientCodec>,
    timeout: Duration,
}

impl UnixClient {
    /// Connect to the daemon socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket does not accept the connection within
    /// the timeout.
    pub async fn connect(config: UnixClientConfig) -> Result<Self> {
        debug!("Connecting to {}", config.socket_path.display());

        let stream = with_timeout(config.timeout, UnixStream::connect(&config.socket_path)).await?;

        Ok(Self {
            framed: Framed::new(stream, ClientCodec::new()),
            timeout: config.timeout,
        })
    }

    /// Users most recently identified, oldest first.
    pub async fn identified_users(&mut self) -> Result<Vec<IdentifiedUser>> {
        match self.request(Request::GetIdentifiedUsers).await? {
            Response::IdentifiedUsers { users } => Ok(users),
            other => Err(ProtocolError::unexpected(other)),
        }
    }

    pub async fn sources(&mut self) -> Result<SourcesStatus> {
        match self.request(Request::GetSources).await? {
            Response::Sources { enabled, disabled } => Ok(SourcesStatus { enabled, disabled }),
            other => Err(ProtocolError::unexpected(other)),
        }
    }

    /// Turn this connection into a stream of identified users.
    pub async fn monitor(mut self) -> Result<Monitor> {
        match self.request(Request::Monitor).await? {
            Response::Monitoring => Ok(Monitor {
                framed: self.framed,
            }),
            other => Err(ProtocolError::unexpected(other)),
        }
    }

    async fn request(&mut self, request: Request) -> Result<Response> {
        trace!(?request, "Sending request");
        with_timeout(self.timeout, self.exchange(request)).await
    }

    async fn exchange(&mut self, request: Request) -> Result<Response> {
        self.framed.send(request).await?;

        match self.framed.next().await {
            Some(Ok(Response::Error { message })) => Err(ProtocolError::UnexpectedResponse(message)),
            Some(response) => response,
            None => Err(ProtocolError::ConnectionClosed),
        }
    }
}

/// Stream of users identified after [`UnixClient::monitor`] returned.
pub struct Monitor {
    framed: Framed<UnixStream, ClientCodec>,
}

impl Monitor {
    /// Wait for the next identified user. `None` once the daemon closed the
    /// connection.
    pub async fn next_user(&mut self) -> Result<Option<IdentifiedUser>> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Ok(Response::UserIdentified { user })) => Ok(Some(user)),
            Some(Ok(other)) => Err(ProtocolError::unexpected(other)),
            Some(Err(e)) => Err(e),
        }
    }
}

async fn with_timeout<T, E: Into<ProtocolError>>(
    timeout: Duration,
    operation: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(ProtocolError::Timeout(timeout.as_millis() as u64)),
    }
}
