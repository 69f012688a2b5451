//! Identification by marker file on removable mass storage.
//!
//! Meant for testing and demos. A file called `pelux-user-id` in the root
//! of a mounted device identifies a user. Its first two lines must read:
//!
//! ```text
//! ID <decimal id>
//! SEAT 0x<16 bit hex seat id>
//! ```
//!
//! Anything after the second line is ignored. While the source is enabled
//! the mount roots are scanned periodically; a marker that appears, or
//! whose content changes, is read and reported again, so another user can
//! be simulated by editing the file.

use crate::error::{MarkerError, Result};
use crate::source::{IdentificationSource, SourceState};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uim_core::config::MassStorageConfig;
use uim_core::constants::{MASS_STORAGE_SOURCE_NAME, USER_ID_FILE_NAME};
use uim_core::{IdentifiedUser, SeatId};

const ID_PREFIX: &str = "ID ";
const SEAT_PREFIX: &str = "SEAT ";

/// Parse marker file content.
///
/// # Errors
///
/// Returns a [`MarkerError`] naming the first rule the content breaks.
///
/// # Examples
///
/// ```
/// use uim_sources::mass_storage::parse_marker;
///
/// let user = parse_marker("ID 1234\nSEAT 0x5678".as_bytes()).unwrap();
/// assert_eq!(user.identification_id(), "MSD-1234");
/// assert_eq!(user.seat_id().as_u16(), 0x5678);
/// ```
pub fn parse_marker(mut reader: impl BufRead) -> Result<IdentifiedUser> {
    let id_line = read_line(&mut reader)?;
    let seat_line = read_line(&mut reader)?;

    let id = id_line
        .strip_prefix(ID_PREFIX)
        .ok_or(MarkerError::MissingIdPrefix)?;
    let seat = seat_line
        .strip_prefix(SEAT_PREFIX)
        .ok_or(MarkerError::MissingSeatPrefix)?;

    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MarkerError::InvalidId);
    }

    let seat_id = SeatId::from_hex_str(seat).map_err(MarkerError::InvalidSeat)?;

    Ok(IdentifiedUser::tagged(MASS_STORAGE_SOURCE_NAME, id, seat_id))
}

/// Read and parse the marker file at `path`, logging why it is rejected.
pub fn read_marker_file(path: &Path) -> Option<IdentifiedUser> {
    let result = std::fs::File::open(path)
        .map_err(MarkerError::from)
        .and_then(|file| parse_marker(std::io::BufReader::new(file)));

    match result {
        Ok(user) => Some(user),
        Err(e) => {
            warn!("{}: {}", path.display(), e);
            None
        }
    }
}

/// One line without its terminating newline. A missing line is an error.
fn read_line(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(MarkerError::TooFewLines);
    }

    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

/// Source reporting `MSD-<id>` users from marker files.
pub struct MassStorageSource {
    state: Rc<SourceState>,
    config: MassStorageConfig,
    watcher: RefCell<Option<JoinHandle<()>>>,
}

impl MassStorageSource {
    pub fn new(config: MassStorageConfig) -> Self {
        Self {
            state: Rc::new(SourceState::new(MASS_STORAGE_SOURCE_NAME)),
            config,
            watcher: RefCell::new(None),
        }
    }

    fn stop_watching(&self) {
        if let Some(watcher) = self.watcher.borrow_mut().take() {
            watcher.abort();
        }
    }
}

impl IdentificationSource for MassStorageSource {
    fn state(&self) -> &SourceState {
        &self.state
    }

    /// Report markers already mounted, then start scanning the mount roots.
    /// Must be called inside a `LocalSet`.
    fn enable(&self) {
        if self.enabled() {
            return;
        }

        self.state.set_enabled(true);

        let known = find_markers(&self.config.mount_roots);
        for path in known.keys() {
            debug!("Marker file {} already mounted", path.display());
            if let Some(user) = read_marker_file(path) {
                self.state.notify(user);
            }
        }

        let watcher = tokio::task::spawn_local(watch_mounts(
            Rc::downgrade(&self.state),
            self.config.mount_roots.clone(),
            self.config.poll_interval(),
            known,
        ));
        *self.watcher.borrow_mut() = Some(watcher);
    }

    fn disable(&self) {
        if !self.enabled() {
            return;
        }

        self.stop_watching();
        self.state.set_enabled(false);
    }
}

impl Drop for MassStorageSource {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

/// What a marker looked like when last seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

async fn watch_mounts(
    state: Weak<SourceState>,
    roots: Vec<PathBuf>,
    period: Duration,
    mut known: HashMap<PathBuf, Fingerprint>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(state) = state.upgrade() else {
            return;
        };

        let found = find_markers(&roots);
        for (path, fingerprint) in &found {
            if known.get(path) == Some(fingerprint) {
                continue;
            }

            debug!("Marker file {} appeared or changed", path.display());
            if let Some(user) = read_marker_file(path) {
                state.notify(user);
            }
        }

        for path in known.keys().filter(|path| !found.contains_key(*path)) {
            debug!("Marker file {} gone", path.display());
        }
        known = found;
    }
}

/// Marker files in mount points one or two levels below each root, as in
/// `/media/<volume>` and `/run/media/<user>/<volume>`.
fn find_markers(roots: &[PathBuf]) -> HashMap<PathBuf, Fingerprint> {
    let mut markers = HashMap::new();

    for root in roots {
        for mount in subdirectories(root) {
            check_marker(&mount, &mut markers);
            for nested in subdirectories(&mount) {
                check_marker(&nested, &mut markers);
            }
        }
    }

    markers
}

fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect()
}

fn check_marker(mount: &Path, markers: &mut HashMap<PathBuf, Fingerprint>) {
    let path = mount.join(USER_ID_FILE_NAME);
    if let Ok(metadata) = std::fs::metadata(&path)
        && metadata.is_file()
    {
        markers.insert(
            path,
            Fingerprint {
                modified: metadata.modified().ok(),
                len: metadata.len(),
            },
        );
    }
}
