//! Data types shared by the reader subsystem backends and the poller.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Name of the pseudo-reader that reports changes of the reader list.
///
/// It always sits at index 0 of the status list handed to
/// [`ReaderContext::wait_for_status_change`](crate::traits::ReaderContext::wait_for_status_change).
pub const READER_LIST_NOTIFICATION_NAME: &str = r"\\?PnP?\Notification";

/// Card identifier read from a reader, plus the reader it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedIdentifier {
    /// Raw identifier bytes, between 4 and 10 bytes long.
    pub identifier: Vec<u8>,

    /// Name of the reader the card was presented to.
    pub reader_name: String,
}

/// Reader state flags as reported by the reader subsystem.
///
/// Only the flags the poller looks at are named. Backends translate their
/// native flag set into this one.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReaderState(u32);

impl ReaderState {
    /// Nothing is known about the reader yet.
    pub const UNAWARE: ReaderState = ReaderState(0x0000);
    pub const IGNORE: ReaderState = ReaderState(0x0001);
    /// The event state differs from the current state.
    pub const CHANGED: ReaderState = ReaderState(0x0002);
    pub const UNKNOWN: ReaderState = ReaderState(0x0004);
    pub const UNAVAILABLE: ReaderState = ReaderState(0x0008);
    /// No card in the reader.
    pub const EMPTY: ReaderState = ReaderState(0x0010);
    /// A card is in the reader.
    pub const PRESENT: ReaderState = ReaderState(0x0020);

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        ReaderState(bits)
    }

    /// Whether all flags of `other` are set. Always true for `UNAWARE`.
    #[must_use]
    pub const fn contains(self, other: ReaderState) -> bool {
        self.0 & other.0 == other.0
    }

    /// Copy of `self` without the flags of `other`.
    #[must_use]
    pub const fn without(self, other: ReaderState) -> Self {
        ReaderState(self.0 & !other.0)
    }
}

impl BitOr for ReaderState {
    type Output = ReaderState;

    fn bitor(self, rhs: ReaderState) -> ReaderState {
        ReaderState(self.0 | rhs.0)
    }
}

impl BitOrAssign for ReaderState {
    fn bitor_assign(&mut self, rhs: ReaderState) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ReaderState, &str); 6] = [
            (ReaderState::IGNORE, "IGNORE"),
            (ReaderState::CHANGED, "CHANGED"),
            (ReaderState::UNKNOWN, "UNKNOWN"),
            (ReaderState::UNAVAILABLE, "UNAVAILABLE"),
            (ReaderState::EMPTY, "EMPTY"),
            (ReaderState::PRESENT, "PRESENT"),
        ];

        if self.0 == 0 {
            return f.write_str("UNAWARE");
        }

        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join(" | "))
    }
}

/// State of one watched reader, both the last observed and the newly
/// reported one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderStatus {
    name: String,
    current_state: ReaderState,
    event_state: ReaderState,
    atr: Vec<u8>,
}

impl ReaderStatus {
    /// Status entry for a reader nothing is known about yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current_state: ReaderState::UNAWARE,
            event_state: ReaderState::UNAWARE,
            atr: Vec::new(),
        }
    }

    /// Status entry for the reader list notification pseudo-reader.
    pub fn reader_list_notification() -> Self {
        Self::new(READER_LIST_NOTIFICATION_NAME)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_state(&self) -> ReaderState {
        self.current_state
    }

    pub fn event_state(&self) -> ReaderState {
        self.event_state
    }

    /// Answer-to-reset of the card in the reader, empty if none.
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    pub fn is_reader_list_notification(&self) -> bool {
        self.name == READER_LIST_NOTIFICATION_NAME
    }

    /// Record what the subsystem reported for this reader.
    pub fn set_event(&mut self, event_state: ReaderState, atr: Vec<u8>) {
        self.event_state = event_state;
        self.atr = atr;
    }

    /// Accept the reported state as the new current state.
    pub fn sync_current_state(&mut self) {
        // CHANGED marks a report, not a reader state; `card_inserted` reads
        // the current state as the state before the next report.
        self.current_state = self.event_state.without(ReaderState::CHANGED);
    }

    pub fn changed(&self) -> bool {
        self.event_state.contains(ReaderState::CHANGED)
    }

    /// A card was inserted into a reader previously known to be empty.
    pub fn card_inserted(&self) -> bool {
        self.changed()
            && self.current_state.contains(ReaderState::EMPTY)
            && self.event_state.contains(ReaderState::PRESENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn status(current: ReaderState, event: ReaderState) -> ReaderStatus {
        let mut status = ReaderStatus::new("Reader 0");
        status.current_state = current;
        status.set_event(event, Vec::new());
        status
    }

    #[rstest]
    #[case(ReaderState::EMPTY, ReaderState::CHANGED | ReaderState::PRESENT, true)]
    #[case(ReaderState::EMPTY, ReaderState::PRESENT, false)]
    #[case(ReaderState::UNAWARE, ReaderState::CHANGED | ReaderState::PRESENT, false)]
    #[case(ReaderState::PRESENT, ReaderState::CHANGED | ReaderState::PRESENT, false)]
    #[case(ReaderState::PRESENT, ReaderState::CHANGED | ReaderState::EMPTY, false)]
    #[case(ReaderState::EMPTY, ReaderState::CHANGED | ReaderState::UNAVAILABLE, false)]
    fn test_card_inserted(
        #[case] current: ReaderState,
        #[case] event: ReaderState,
        #[case] expected: bool,
    ) {
        assert_eq!(status(current, event).card_inserted(), expected);
    }

    #[test]
    fn test_sync_current_state_drops_changed_flag() {
        let mut status = status(ReaderState::EMPTY, ReaderState::CHANGED | ReaderState::PRESENT);
        status.sync_current_state();
        assert_eq!(status.current_state(), ReaderState::PRESENT);
        assert!(!status.card_inserted());
    }

    #[test]
    fn test_reader_list_notification() {
        let status = ReaderStatus::reader_list_notification();
        assert!(status.is_reader_list_notification());
        assert_eq!(status.current_state(), ReaderState::UNAWARE);
        assert!(!ReaderStatus::new("Reader 0").is_reader_list_notification());
    }

    #[test]
    fn test_reader_state_debug() {
        assert_eq!(format!("{:?}", ReaderState::UNAWARE), "UNAWARE");
        assert_eq!(
            format!("{:?}", ReaderState::CHANGED | ReaderState::PRESENT),
            "CHANGED | PRESENT"
        );
    }

    #[test]
    fn test_reader_state_contains() {
        let state = ReaderState::CHANGED | ReaderState::EMPTY;
        assert!(state.contains(ReaderState::EMPTY));
        assert!(!state.contains(ReaderState::PRESENT));
        assert!(state.contains(ReaderState::UNAWARE));
        assert_eq!(state.without(ReaderState::CHANGED), ReaderState::EMPTY);
    }
}
