use thiserror::Error;

/// Reasons a `pelux-user-id` marker file yields no identification.
#[derive(Error, Debug)]
pub enum MarkerError {
    #[error("failed to read 2 first lines")]
    TooFewLines,

    #[error("first line must start with \"ID \"")]
    MissingIdPrefix,

    #[error("second line must start with \"SEAT \"")]
    MissingSeatPrefix,

    #[error("ID must be followed by a numeric string")]
    InvalidId,

    #[error("SEAT must be followed by a hexadecimal 16 bit string")]
    InvalidSeat(#[source] uim_core::Error),

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MarkerError>;
