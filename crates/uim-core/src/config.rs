//! Daemon configuration.
//!
//! The configuration is a TOML file. Every table and key is optional:
//!
//! ```toml
//! [sources]
//! enable = ["SCARD"]        # empty or absent: enable all sources
//!
//! [daemon]
//! max_saved_identified_users = 10
//! socket_path = "/run/uim/uim.sock"
//!
//! [mass_storage]
//! mount_roots = ["/media", "/run/media"]
//! poll_interval_ms = 1000
//! ```
//!
//! [`Configuration::from_file`] never fails. A missing file silently yields
//! the defaults, an unreadable or invalid file is logged and also yields the
//! defaults, so the daemon always starts.

use crate::constants::{
    DEFAULT_CONFIG_FILE, DEFAULT_MAX_SAVED_IDENTIFIED_USERS, DEFAULT_MOUNT_POLL_INTERVAL_MS,
    DEFAULT_MOUNT_ROOTS, DEFAULT_SOCKET_PATH,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Complete daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// File the configuration was read from. Not part of the file itself.
    #[serde(skip)]
    pub config_file: PathBuf,

    pub sources: SourcesConfig,

    pub daemon: DaemonConfig,

    pub mass_storage: MassStorageConfig,
}

/// Which identification sources to enable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Source names to enable, compared case-insensitively. Empty means all.
    pub enable: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Capacity of the identified user history.
    pub max_saved_identified_users: usize,

    /// Unix socket path of the service.
    pub socket_path: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_saved_identified_users: DEFAULT_MAX_SAVED_IDENTIFIED_USERS,
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MassStorageConfig {
    /// Directories under which removable devices get mounted.
    pub mount_roots: Vec<PathBuf>,

    /// Interval between two scans of the mount roots.
    pub poll_interval_ms: u64,
}

impl Default for MassStorageConfig {
    fn default() -> Self {
        Self {
            mount_roots: DEFAULT_MOUNT_ROOTS.iter().map(PathBuf::from).collect(),
            poll_interval_ms: DEFAULT_MOUNT_POLL_INTERVAL_MS,
        }
    }
}

impl MassStorageConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            sources: SourcesConfig::default(),
            daemon: DaemonConfig::default(),
            mass_storage: MassStorageConfig::default(),
        }
    }
}

impl Configuration {
    /// Read the configuration from `path`, falling back to the defaults.
    ///
    /// The returned configuration always remembers `path` as its
    /// `config_file`, so a later reload reads the same file.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        match Self::load(path) {
            Ok(config) => config,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration file at {}, using defaults", path.display());
                Self::with_config_file(path)
            }
            Err(e) => {
                warn!("Failed to load {}: {}", path.display(), e);
                Self::with_config_file(path)
            }
        }
    }

    /// Read and validate the configuration from `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid TOML or
    /// holds invalid values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;

        let mut config = Self::parse(&data)?;
        config.config_file = path.to_path_buf();

        Ok(config)
    }

    /// Parse and validate configuration file content.
    ///
    /// # Errors
    /// Returns `Error::ConfigParse` for malformed TOML and `Error::Config` for
    /// out of range values.
    pub fn parse(data: &str) -> Result<Self> {
        let config: Self = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    fn with_config_file(path: &Path) -> Self {
        Self {
            config_file: path.to_path_buf(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.daemon.max_saved_identified_users == 0 {
            return Err(Error::Config(
                "daemon.max_saved_identified_users must be at least 1".to_string(),
            ));
        }

        if self.mass_storage.poll_interval_ms == 0 {
            return Err(Error::Config(
                "mass_storage.poll_interval_ms must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
