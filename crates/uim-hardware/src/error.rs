//! Error types for card reader operations.
//!
//! Every failure the smart card poller can run into is represented here.
//! None of them reach the consumer: the poller logs them and aborts the
//! current attempt, so a presented card either produces a complete
//! identifier or nothing.

/// Result type alias for card reader operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to the card reader subsystem.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The reader subsystem context could not be established.
    #[error("Reader context unavailable: {message}")]
    ContextUnavailable { message: String },

    /// A blocking status wait was cancelled.
    #[error("Status wait cancelled")]
    Cancelled,

    /// No card is present in the reader.
    #[error("No card present in reader \"{reader}\"")]
    NoCard { reader: String },

    /// Reader or card communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// The card answered with fewer bytes than an identifier needs.
    #[error("Response too short: received {received} bytes, expected at least {expected}")]
    ResponseTooShort { received: usize, expected: usize },

    /// The card answered with a non-success status word.
    #[error("Card returned status 0x{status:04x}")]
    CardStatus { status: u16 },

    /// The card type does not support identifier extraction.
    #[error("Unsupported card: {message}")]
    UnsupportedCard { message: String },

    /// Invalid data handed to or received from the subsystem.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },
}

impl HardwareError {
    /// Create a new context unavailable error.
    pub fn context_unavailable(message: impl Into<String>) -> Self {
        Self::ContextUnavailable {
            message: message.into(),
        }
    }

    /// Create a new no card error.
    pub fn no_card(reader: impl Into<String>) -> Self {
        Self::NoCard {
            reader: reader.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new unsupported card error.
    pub fn unsupported_card(message: impl Into<String>) -> Self {
        Self::UnsupportedCard {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Whether this error only reports a cancelled wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_unavailable_error() {
        let error = HardwareError::context_unavailable("service not running");
        assert!(matches!(error, HardwareError::ContextUnavailable { .. }));
        assert_eq!(
            error.to_string(),
            "Reader context unavailable: service not running"
        );
    }

    #[test]
    fn test_response_too_short_error() {
        let error = HardwareError::ResponseTooShort {
            received: 3,
            expected: 6,
        };
        assert_eq!(
            error.to_string(),
            "Response too short: received 3 bytes, expected at least 6"
        );
    }

    #[test]
    fn test_card_status_error() {
        let error = HardwareError::CardStatus { status: 0x6a82 };
        assert_eq!(error.to_string(), "Card returned status 0x6a82");
    }

    #[test]
    fn test_no_card_error() {
        let error = HardwareError::no_card("ACR122U 00 00");
        assert_eq!(
            error.to_string(),
            "No card present in reader \"ACR122U 00 00\""
        );
    }

    #[test]
    fn test_is_cancelled() {
        assert!(HardwareError::Cancelled.is_cancelled());
        assert!(!HardwareError::communication("reader gone").is_cancelled());
    }
}
