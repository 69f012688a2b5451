//! Card reader subsystem abstraction.
//!
//! The poller only needs a handful of operations from the platform's reader
//! subsystem: establish a context, list readers, block until reader states
//! change, cancel that wait from another thread, and exchange one command
//! with a card. These traits describe exactly that, so the native PC/SC
//! backend and the mock backend are interchangeable.
//!
//! All calls are blocking and happen on the poller's dedicated thread,
//! except [`WaitCanceller::cancel`] which is made from the thread that shuts
//! the poller down.

use crate::error::Result;
use crate::types::ReaderStatus;

/// Entry point into a reader subsystem.
pub trait CardReaderSubsystem: Send + 'static {
    type Context: ReaderContext;

    /// Establish a context with the subsystem.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::ContextUnavailable` if the subsystem cannot be
    /// reached. The poller stays inert in that case.
    fn establish_context(&self) -> Result<Self::Context>;
}

/// An established reader subsystem context.
///
/// Dropping the context releases it.
pub trait ReaderContext: Send + 'static {
    type Canceller: WaitCanceller;
    type Connection: CardConnection;

    /// Handle that can interrupt a blocked [`wait_for_status_change`] from
    /// another thread.
    ///
    /// [`wait_for_status_change`]: ReaderContext::wait_for_status_change
    fn canceller(&self) -> Self::Canceller;

    /// Names of the currently attached readers.
    fn list_readers(&mut self) -> Result<Vec<String>>;

    /// Block until the state of any entry differs from its current state.
    ///
    /// On success the event state and ATR of each entry are updated. Current
    /// states are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Cancelled` when interrupted by the canceller.
    fn wait_for_status_change(&mut self, states: &mut [ReaderStatus]) -> Result<()>;

    /// Connect exclusively to the card in `reader`.
    fn connect(&mut self, reader: &str) -> Result<Self::Connection>;
}

/// Cancels a pending status wait.
pub trait WaitCanceller: Send + Sync + 'static {
    /// Request cancellation of the wait currently blocking, if any.
    ///
    /// A request may be lost when no wait is pending yet, callers retry.
    fn cancel(&self) -> Result<()>;
}

/// Connection to a card. Dropping it disconnects and leaves the card powered.
pub trait CardConnection {
    /// Send `command` and write the answer into `response`.
    ///
    /// Returns the number of bytes received.
    fn transmit(&mut self, command: &[u8], response: &mut [u8]) -> Result<usize>;
}
