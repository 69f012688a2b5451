//! Unix socket server exposing the identification manager.
//!
//! # Architecture
//!
//! ```text
//! uim client ┐
//!            │
//! uim client ├──> UnixServer ──> ManagerBackend (SourceGroup)
//!            │        │
//! monitor    ┘        └──< EventPublisher <── user identified
//! ```
//!
//! The server runs on the consumer context. Every connection is served by
//! its own local task, so the backend does not need to be `Send`. A
//! connection answers any number of requests until the client sends
//! `Monitor`; from then on it only streams `UserIdentified` notifications
//! until either side closes it.

use crate::codec::ServerCodec;
use crate::error::{ProtocolError, Result};
use crate::message::{Request, Response};
use futures::{SinkExt, StreamExt};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};
use uim_core::IdentifiedUser;

/// Notifications buffered per monitoring client before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What the server needs from the identification manager.
pub trait ManagerBackend {
    /// Remembered users, oldest first.
    fn identified_users(&self) -> Vec<IdentifiedUser>;

    /// Names of the enabled and the disabled sources.
    fn sources(&self) -> (Vec<String>, Vec<String>);
}

/// Handle to push `UserIdentified` notifications to monitoring clients.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<IdentifiedUser>,
}

impl EventPublisher {
    /// Send `user` to every monitoring client. Returns how many received it.
    pub fn publish(&self, user: &IdentifiedUser) -> usize {
        self.sender.send(user.clone()).unwrap_or(0)
    }

    pub fn monitor_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Server bound to a Unix socket path.
///
/// The socket file is removed again when the server is dropped.
pub struct UnixServer {
    listener: UnixListener,
    path: PathBuf,
    publisher: EventPublisher,
}

impl UnixServer {
    /// Bind to `path`, creating its parent directory and replacing a stale
    /// socket file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the stale socket
    /// cannot be removed or the bind fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(path)?;
        info!("Listening on {}", path.display());

        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            publisher: EventPublisher { sender },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// Accept and serve connections until the listener fails.
    ///
    /// Must be polled inside a `LocalSet`.
    ///
    /// # Errors
    ///
    /// Returns the listener's I/O error. Errors of single connections are
    /// logged and never end the loop.
    pub async fn run<B: ManagerBackend + 'static>(&self, backend: Rc<B>) -> Result<()> {
        loop {
            let (stream, _) = self.listener.accept().await?;
            debug!("Client connected");

            let backend = Rc::clone(&backend);
            let publisher = self.publisher.clone();
            tokio::task::spawn_local(async move {
                match serve_connection(stream, backend.as_ref(), &publisher).await {
                    Ok(()) => debug!("Client disconnected"),
                    Err(e) => warn!("Client connection failed: {}", e),
                }
            });
        }
    }
}

impl Drop for UnixServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

async fn serve_connection<B: ManagerBackend>(
    stream: UnixStream,
    backend: &B,
    publisher: &EventPublisher,
) -> Result<()> {
    let mut framed = Framed::new(stream, ServerCodec::new());

    while let Some(request) = framed.next().await {
        let request = match request {
            Ok(request) => request,
            Err(ProtocolError::Json(e)) => {
                warn!("Invalid request: {}", e);
                framed
                    .send(Response::Error {
                        message: e.to_string(),
                    })
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        trace!(?request, "Received request");

        let response = match request {
            Request::GetIdentifiedUsers => Response::IdentifiedUsers {
                users: backend.identified_users(),
            },
            Request::GetSources => {
                let (enabled, disabled) = backend.sources();
                Response::Sources { enabled, disabled }
            }
            Request::Monitor => return stream_events(framed, publisher).await,
        };

        framed.send(response).await?;
    }

    Ok(())
}

async fn stream_events(
    mut framed: Framed<UnixStream, ServerCodec>,
    publisher: &EventPublisher,
) -> Result<()> {
    let mut events = publisher.sender.subscribe();
    framed.send(Response::Monitoring).await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(user) => framed.send(Response::UserIdentified { user }).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Monitoring client too slow, {} notifications dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            frame = framed.next() => match frame {
                None => return Ok(()),
                Some(Err(e)) => return Err(e),
                Some(Ok(request)) => debug!(?request, "Ignoring request on monitoring connection"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_creates_parent_and_removes_socket_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("uim.sock");

        let server = UnixServer::bind(&path).unwrap();
        assert_eq!(server.path(), path.as_path());
        assert!(path.exists());

        drop(server);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uim.sock");
        std::fs::write(&path, b"stale").unwrap();

        let server = UnixServer::bind(&path);

        assert!(server.is_ok());
    }

    #[tokio::test]
    async fn test_publish_without_monitors() {
        let dir = tempfile::tempdir().unwrap();
        let server = UnixServer::bind(dir.path().join("uim.sock")).unwrap();
        let publisher = server.publisher();

        let user = IdentifiedUser::new("MSD-1", uim_core::SeatId::MAIN_USER);

        assert_eq!(publisher.monitor_count(), 0);
        assert_eq!(publisher.publish(&user), 0);
    }
}
