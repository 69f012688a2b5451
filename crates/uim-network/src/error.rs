use thiserror::Error;

/// Errors of the service transport.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame is not valid JSON for the expected message type
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame exceeds the codec limit
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Peer answered with a message that does not match the request
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Peer closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation did not complete in time
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ProtocolError {
    pub fn unexpected(response: impl std::fmt::Debug) -> Self {
        Self::UnexpectedResponse(format!("{response:?}"))
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
