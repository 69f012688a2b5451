//! Mock card reader subsystem.

use crate::error::{HardwareError, Result};
use crate::traits::{CardConnection, CardReaderSubsystem, ReaderContext, WaitCanceller};
use crate::types::{ReaderState, ReaderStatus};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// ATR of a MIFARE Classic 1K card seen through a contactless reader.
pub const SUPPORTED_ATR: [u8; 20] = [
    0x3b, 0x8f, 0x80, 0x01, 0x80, 0x4f, 0x0c, 0xa0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x01,
    0x00, 0x00, 0x00, 0x00, 0x6a,
];

/// What a mock card does when talked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Answer every command with these bytes.
    Data(Vec<u8>),

    /// Fail every transmission.
    TransmitError,

    /// Refuse connections.
    ConnectError,
}

/// A card that can be inserted into a mock reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCard {
    pub atr: Vec<u8>,
    pub response: MockResponse,
}

impl MockCard {
    /// Card with a supported ATR answering `Get Data` with `uid`.
    ///
    /// # Examples
    ///
    /// ```
    /// use uim_hardware::mock::{MockCard, MockResponse};
    ///
    /// let card = MockCard::with_uid(&[0x04, 0xa1, 0xb2, 0xc3]);
    /// assert_eq!(
    ///     card.response,
    ///     MockResponse::Data(vec![0x04, 0xa1, 0xb2, 0xc3, 0x90, 0x00])
    /// );
    /// ```
    pub fn with_uid(uid: &[u8]) -> Self {
        let mut response = uid.to_vec();
        response.extend_from_slice(&[0x90, 0x00]);
        Self::with_response(response)
    }

    /// Card with a supported ATR answering every command with `response`.
    pub fn with_response(response: Vec<u8>) -> Self {
        Self {
            atr: SUPPORTED_ATR.to_vec(),
            response: MockResponse::Data(response),
        }
    }

    /// Replace the ATR.
    pub fn atr(mut self, atr: &[u8]) -> Self {
        self.atr = atr.to_vec();
        self
    }

    pub fn failing(response: MockResponse) -> Self {
        Self {
            atr: SUPPORTED_ATR.to_vec(),
            response,
        }
    }
}

#[derive(Debug)]
struct MockReader {
    name: String,
    card: Option<MockCard>,
}

#[derive(Debug, Default)]
struct MockState {
    unavailable: bool,
    readers: Vec<MockReader>,

    waiting: bool,
    wait_calls: usize,
    cancel_pending: bool,
    cancel_calls: usize,
    lost_cancels: usize,

    contexts_established: usize,
    contexts_released: usize,
    connect_attempts: usize,
    connections: usize,
    disconnects: usize,
    commands: Vec<Vec<u8>>,
}

impl MockState {
    fn reader(&self, name: &str) -> Option<&MockReader> {
        self.readers.iter().find(|reader| reader.name == name)
    }

    fn reader_mut(&mut self, name: &str) -> Option<&mut MockReader> {
        self.readers.iter_mut().find(|reader| reader.name == name)
    }

    /// Fill in event states. Returns whether any entry changed.
    fn report(&self, states: &mut [ReaderStatus]) -> bool {
        let watched = states
            .iter()
            .filter(|status| !status.is_reader_list_notification())
            .map(ReaderStatus::name);
        let list_changed = !watched.eq(self.readers.iter().map(|reader| reader.name.as_str()));

        let mut any_changed = false;
        for status in states.iter_mut() {
            if status.is_reader_list_notification() {
                if list_changed {
                    status.set_event(ReaderState::CHANGED, Vec::new());
                    any_changed = true;
                } else {
                    status.set_event(status.current_state(), Vec::new());
                }
                continue;
            }

            let (actual, atr) = match self.reader(status.name()) {
                None => (ReaderState::UNKNOWN, Vec::new()),
                Some(MockReader { card: None, .. }) => (ReaderState::EMPTY, Vec::new()),
                Some(MockReader {
                    card: Some(card), ..
                }) => (ReaderState::PRESENT, card.atr.clone()),
            };

            if actual == status.current_state() {
                status.set_event(actual, atr);
            } else {
                status.set_event(actual | ReaderState::CHANGED, atr);
                any_changed = true;
            }
        }

        any_changed
    }
}

#[derive(Debug, Default)]
struct MockShared {
    state: Mutex<MockState>,
    changed: Condvar,
}

impl MockShared {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let result = f(&mut self.state());
        self.changed.notify_all();
        result
    }
}

/// Mock reader subsystem.
///
/// # Examples
///
/// ```
/// use uim_hardware::mock::{MockCard, MockCardReaders};
///
/// let (readers, handle) = MockCardReaders::new();
/// handle.add_reader("Reader 0");
/// handle.insert_card("Reader 0", MockCard::with_uid(&[0x04, 0xa1, 0xb2, 0xc3]));
/// # drop(readers);
/// ```
#[derive(Debug)]
pub struct MockCardReaders {
    shared: Arc<MockShared>,
}

impl MockCardReaders {
    /// Create a subsystem without readers, plus the handle controlling it.
    pub fn new() -> (Self, MockCardReadersHandle) {
        let shared = Arc::new(MockShared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockCardReadersHandle { shared },
        )
    }

    /// Create a subsystem whose context can not be established.
    pub fn unavailable() -> (Self, MockCardReadersHandle) {
        let (readers, handle) = Self::new();
        readers.shared.state().unavailable = true;
        (readers, handle)
    }
}

impl CardReaderSubsystem for MockCardReaders {
    type Context = MockContext;

    fn establish_context(&self) -> Result<MockContext> {
        self.shared.update(|state| {
            if state.unavailable {
                return Err(HardwareError::context_unavailable("mock subsystem unavailable"));
            }
            state.contexts_established += 1;
            Ok(MockContext {
                shared: Arc::clone(&self.shared),
            })
        })
    }
}

#[derive(Debug)]
pub struct MockContext {
    shared: Arc<MockShared>,
}

impl ReaderContext for MockContext {
    type Canceller = MockCanceller;
    type Connection = MockConnection;

    fn canceller(&self) -> MockCanceller {
        MockCanceller {
            shared: Arc::clone(&self.shared),
        }
    }

    fn list_readers(&mut self) -> Result<Vec<String>> {
        Ok(self
            .shared
            .state()
            .readers
            .iter()
            .map(|reader| reader.name.clone())
            .collect())
    }

    fn wait_for_status_change(&mut self, states: &mut [ReaderStatus]) -> Result<()> {
        let mut state = self.shared.state();
        state.wait_calls += 1;
        state.waiting = true;
        self.shared.changed.notify_all();

        let result = loop {
            if state.cancel_pending {
                state.cancel_pending = false;
                break Err(HardwareError::Cancelled);
            }
            if state.report(states) {
                break Ok(());
            }
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        };

        state.waiting = false;
        self.shared.changed.notify_all();
        result
    }

    fn connect(&mut self, reader: &str) -> Result<MockConnection> {
        self.shared.update(|state| {
            state.connect_attempts += 1;

            let card = state
                .reader(reader)
                .and_then(|reader| reader.card.as_ref())
                .ok_or_else(|| HardwareError::no_card(reader))?;
            if card.response == MockResponse::ConnectError {
                return Err(HardwareError::communication("mock connect refused"));
            }

            let response = card.response.clone();
            state.connections += 1;
            Ok(MockConnection {
                shared: Arc::clone(&self.shared),
                response,
            })
        })
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.shared.update(|state| state.contexts_released += 1);
    }
}

/// Cancels the mock's pending status wait.
///
/// Requests made while no wait is pending are lost, like with a real
/// subsystem.
#[derive(Debug)]
pub struct MockCanceller {
    shared: Arc<MockShared>,
}

impl WaitCanceller for MockCanceller {
    fn cancel(&self) -> Result<()> {
        self.shared.update(|state| {
            state.cancel_calls += 1;
            if !state.waiting {
                return;
            }
            if state.lost_cancels > 0 {
                state.lost_cancels -= 1;
                return;
            }
            state.cancel_pending = true;
        });
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockConnection {
    shared: Arc<MockShared>,
    response: MockResponse,
}

impl CardConnection for MockConnection {
    fn transmit(&mut self, command: &[u8], response: &mut [u8]) -> Result<usize> {
        self.shared.update(|state| state.commands.push(command.to_vec()));

        match &self.response {
            MockResponse::Data(data) => {
                let target = response.get_mut(..data.len()).ok_or_else(|| {
                    HardwareError::communication("mock response exceeds receive buffer")
                })?;
                target.copy_from_slice(data);
                Ok(data.len())
            }
            MockResponse::TransmitError | MockResponse::ConnectError => {
                Err(HardwareError::communication("mock transmission failed"))
            }
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.shared.update(|state| state.disconnects += 1);
    }
}

/// Handle for controlling a [`MockCardReaders`] subsystem.
#[derive(Debug, Clone)]
pub struct MockCardReadersHandle {
    shared: Arc<MockShared>,
}

impl MockCardReadersHandle {
    /// Attach a reader without a card.
    pub fn add_reader(&self, name: impl Into<String>) {
        let name = name.into();
        self.shared.update(|state| {
            if state.reader(&name).is_none() {
                state.readers.push(MockReader { name, card: None });
            }
        });
    }

    pub fn remove_reader(&self, name: &str) {
        self.shared
            .update(|state| state.readers.retain(|reader| reader.name != name));
    }

    /// Put `card` into `reader`, replacing any card already there.
    ///
    /// Returns `false` if no such reader is attached.
    pub fn insert_card(&self, reader: &str, card: MockCard) -> bool {
        self.shared.update(|state| match state.reader_mut(reader) {
            Some(reader) => {
                reader.card = Some(card);
                true
            }
            None => false,
        })
    }

    pub fn remove_card(&self, reader: &str) {
        self.shared.update(|state| {
            if let Some(reader) = state.reader_mut(reader) {
                reader.card = None;
            }
        });
    }

    /// Make the next `count` effective cancel requests get lost.
    pub fn lose_cancels(&self, count: usize) {
        self.shared.update(|state| state.lost_cancels = count);
    }

    /// Block until the poller sits in its `count`th status wait or later.
    ///
    /// Returns `false` on timeout.
    pub fn wait_until_waiting(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state();

        while !(state.waiting && state.wait_calls >= count) {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            state = match self.shared.changed.wait_timeout(state, remaining) {
                Ok((state, _)) => state,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }

        true
    }

    pub fn wait_calls(&self) -> usize {
        self.shared.state().wait_calls
    }

    pub fn cancel_calls(&self) -> usize {
        self.shared.state().cancel_calls
    }

    pub fn contexts_established(&self) -> usize {
        self.shared.state().contexts_established
    }

    pub fn contexts_released(&self) -> usize {
        self.shared.state().contexts_released
    }

    pub fn connect_attempts(&self) -> usize {
        self.shared.state().connect_attempts
    }

    pub fn connections(&self) -> usize {
        self.shared.state().connections
    }

    pub fn disconnects(&self) -> usize {
        self.shared.state().disconnects
    }

    /// Commands transmitted to cards so far.
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.shared.state().commands.clone()
    }
}
