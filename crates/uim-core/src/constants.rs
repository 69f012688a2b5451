//! Constants shared across the identification manager.
//!
//! # Identifier format
//!
//! Every identification id is a mechanism tag followed by a separator and a
//! mechanism-specific suffix:
//!
//! ```text
//! SCARD-04a1b2c3        smart card, lowercase hex of the card UID
//! MSD-1234              mass storage marker file, decimal id
//! ```
//!
//! The tag keeps identities from different mechanisms distinguishable even if
//! their suffixes collide.

/// Name of the smart card identification source, also its identifier tag.
pub const SMART_CARD_SOURCE_NAME: &str = "SCARD";

/// Name of the mass storage identification source, also its identifier tag.
pub const MASS_STORAGE_SOURCE_NAME: &str = "MSD";

/// Separator between the mechanism tag and the identifier suffix.
pub const IDENTIFIER_SEPARATOR: char = '-';

/// Marker file looked up in the root of mounted mass storage devices.
pub const USER_ID_FILE_NAME: &str = "pelux-user-id";

// ============================================================================
// Daemon defaults
// ============================================================================

/// Number of identified users kept in the history when not configured.
pub const DEFAULT_MAX_SAVED_IDENTIFIED_USERS: usize = 10;

/// Configuration file read by the daemon when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/uim/uim-daemon.toml";

/// Unix socket the service listens on.
pub const DEFAULT_SOCKET_PATH: &str = "/run/uim/uim.sock";

/// Directories scanned for mounted mass storage devices.
pub const DEFAULT_MOUNT_ROOTS: &[&str] = &["/media", "/run/media"];

/// Interval between two scans of the mount roots, in milliseconds.
pub const DEFAULT_MOUNT_POLL_INTERVAL_MS: u64 = 1000;
