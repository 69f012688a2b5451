//! Native PC/SC backend built on the `pcsc` crate.

use crate::error::{HardwareError, Result};
use crate::traits::{CardConnection, CardReaderSubsystem, ReaderContext, WaitCanceller};
use crate::types::{ReaderState, ReaderStatus};
use ::pcsc::{Card, Context, Disposition, PNP_NOTIFICATION, Protocols, Scope, ShareMode, State};
use std::ffi::CString;
use tracing::warn;

/// The system PC/SC service.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcscSubsystem;

impl CardReaderSubsystem for PcscSubsystem {
    type Context = PcscContext;

    fn establish_context(&self) -> Result<PcscContext> {
        let context = Context::establish(Scope::System)
            .map_err(|e| HardwareError::context_unavailable(e.to_string()))?;

        Ok(PcscContext {
            context,
            native_states: Vec::new(),
        })
    }
}

/// Established PC/SC context.
///
/// Keeps its own list of native reader states so the reader list
/// notification counter survives between waits.
pub struct PcscContext {
    context: Context,
    native_states: Vec<::pcsc::ReaderState>,
}

impl PcscContext {
    fn needs_rebuild(&self, states: &[ReaderStatus]) -> bool {
        self.native_states.len() != states.len()
            || self
                .native_states
                .iter()
                .zip(states)
                .any(|(native, status)| native.name().to_bytes() != status.name().as_bytes())
            || states.iter().any(|status| {
                !status.is_reader_list_notification() && status.current_state() == ReaderState::UNAWARE
            })
    }

    fn rebuild(&mut self, states: &[ReaderStatus]) -> Result<()> {
        let mut notification = std::mem::take(&mut self.native_states)
            .into_iter()
            .find(|native| native.name() == PNP_NOTIFICATION());

        for status in states {
            if status.is_reader_list_notification()
                && let Some(native) = notification.take()
            {
                self.native_states.push(native);
                continue;
            }

            let name = CString::new(status.name()).map_err(|_| {
                HardwareError::invalid_data(format!("Reader name with NUL byte: {:?}", status.name()))
            })?;
            self.native_states
                .push(::pcsc::ReaderState::new(name, State::UNAWARE));
        }

        Ok(())
    }
}

impl ReaderContext for PcscContext {
    type Canceller = PcscCanceller;
    type Connection = PcscConnection;

    fn canceller(&self) -> PcscCanceller {
        PcscCanceller(self.context.clone())
    }

    fn list_readers(&mut self) -> Result<Vec<String>> {
        match self.context.list_readers_owned() {
            Ok(readers) => Ok(readers
                .into_iter()
                .map(|reader| reader.to_string_lossy().into_owned())
                .collect()),
            Err(::pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
            Err(e) => Err(HardwareError::communication(format!("Listing readers: {e}"))),
        }
    }

    fn wait_for_status_change(&mut self, states: &mut [ReaderStatus]) -> Result<()> {
        if self.needs_rebuild(states) {
            self.rebuild(states)?;
        }

        self.context
            .get_status_change(None, &mut self.native_states)
            .map_err(|e| match e {
                ::pcsc::Error::Cancelled => HardwareError::Cancelled,
                e => HardwareError::communication(format!("Waiting for status change: {e}")),
            })?;

        for (status, native) in states.iter_mut().zip(self.native_states.iter_mut()) {
            status.set_event(convert_state(native.event_state()), native.atr().to_vec());
            native.sync_current_state();
        }

        Ok(())
    }

    fn connect(&mut self, reader: &str) -> Result<PcscConnection> {
        let name = CString::new(reader)
            .map_err(|_| HardwareError::invalid_data(format!("Reader name with NUL byte: {reader:?}")))?;

        let card = self
            .context
            .connect(&name, ShareMode::Exclusive, Protocols::T0 | Protocols::T1)
            .map_err(|e| match e {
                ::pcsc::Error::NoSmartcard | ::pcsc::Error::RemovedCard => HardwareError::no_card(reader),
                e => HardwareError::communication(format!("Connecting to \"{reader}\": {e}")),
            })?;

        Ok(PcscConnection { card: Some(card) })
    }
}

/// Cancels a blocked `SCardGetStatusChange`.
pub struct PcscCanceller(Context);

impl WaitCanceller for PcscCanceller {
    fn cancel(&self) -> Result<()> {
        self.0
            .cancel()
            .map_err(|e| HardwareError::communication(format!("Cancelling status wait: {e}")))
    }
}

/// Exclusive connection to a card.
pub struct PcscConnection {
    card: Option<Card>,
}

impl CardConnection for PcscConnection {
    fn transmit(&mut self, command: &[u8], response: &mut [u8]) -> Result<usize> {
        let card = self
            .card
            .as_ref()
            .ok_or_else(|| HardwareError::communication("Card already disconnected"))?;

        let answer = card
            .transmit(command, response)
            .map_err(|e| HardwareError::communication(format!("Transmitting command: {e}")))?;

        Ok(answer.len())
    }
}

impl Drop for PcscConnection {
    fn drop(&mut self) {
        if let Some(card) = self.card.take()
            && let Err((_, e)) = card.disconnect(Disposition::LeaveCard)
        {
            warn!("Failed to disconnect from card: {}", e);
        }
    }
}

fn convert_state(native: State) -> ReaderState {
    const FLAGS: [(State, ReaderState); 6] = [
        (State::IGNORE, ReaderState::IGNORE),
        (State::CHANGED, ReaderState::CHANGED),
        (State::UNKNOWN, ReaderState::UNKNOWN),
        (State::UNAVAILABLE, ReaderState::UNAVAILABLE),
        (State::EMPTY, ReaderState::EMPTY),
        (State::PRESENT, ReaderState::PRESENT),
    ];

    FLAGS
        .iter()
        .filter(|(flag, _)| native.contains(*flag))
        .fold(ReaderState::UNAWARE, |state, (_, flag)| state | *flag)
}
