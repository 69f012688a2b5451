//! Subsystem used when no reader backend is compiled in.

use crate::error::{HardwareError, Result};
use crate::traits::{CardConnection, CardReaderSubsystem, ReaderContext, WaitCanceller};
use crate::types::ReaderStatus;

/// Reader subsystem that can never be reached.
///
/// A poller built on it is inert: it starts, logs that no context could be
/// established and never reports a card.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableSubsystem;

/// Context of [`UnavailableSubsystem`]. Cannot be constructed.
#[derive(Debug)]
pub enum NoContext {}

impl CardReaderSubsystem for UnavailableSubsystem {
    type Context = NoContext;

    fn establish_context(&self) -> Result<NoContext> {
        Err(HardwareError::context_unavailable(
            "built without a card reader backend",
        ))
    }
}

impl ReaderContext for NoContext {
    type Canceller = NoCanceller;
    type Connection = NoContext;

    fn canceller(&self) -> NoCanceller {
        match *self {}
    }

    fn list_readers(&mut self) -> Result<Vec<String>> {
        match *self {}
    }

    fn wait_for_status_change(&mut self, _states: &mut [ReaderStatus]) -> Result<()> {
        match *self {}
    }

    fn connect(&mut self, _reader: &str) -> Result<NoContext> {
        match *self {}
    }
}

impl CardConnection for NoContext {
    fn transmit(&mut self, _command: &[u8], _response: &mut [u8]) -> Result<usize> {
        match *self {}
    }
}

#[derive(Debug)]
pub enum NoCanceller {}

impl WaitCanceller for NoCanceller {
    fn cancel(&self) -> Result<()> {
        match *self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_establish_context_fails() {
        let result = UnavailableSubsystem.establish_context();
        assert!(matches!(result, Err(HardwareError::ContextUnavailable { .. })));
    }
}
