//! Identification by contactless smart card UID.

use crate::source::{IdentificationSource, SourceState};
use std::rc::Rc;
use tracing::debug;
use uim_core::constants::SMART_CARD_SOURCE_NAME;
use uim_core::{IdentifiedUser, SeatId, render_hex};
use uim_hardware::{ExtractedIdentifier, SmartCardPoller};

/// Source reporting `SCARD-<hex uid>` for every card presented to any
/// reader.
///
/// All cards identify the main user seat, whatever reader they were
/// presented to.
pub struct SmartCardSource {
    state: Rc<SourceState>,
    poller: Rc<SmartCardPoller>,
}

impl SmartCardSource {
    pub fn new(poller: Rc<SmartCardPoller>) -> Self {
        Self {
            state: Rc::new(SourceState::new(SMART_CARD_SOURCE_NAME)),
            poller,
        }
    }

    /// Map an extracted card identifier to the user it identifies.
    pub fn identified_user(extracted: &ExtractedIdentifier) -> IdentifiedUser {
        IdentifiedUser::tagged(
            SMART_CARD_SOURCE_NAME,
            &render_hex(&extracted.identifier),
            SeatId::MAIN_USER,
        )
    }
}

impl IdentificationSource for SmartCardSource {
    fn state(&self) -> &SourceState {
        &self.state
    }

    fn enable(&self) {
        if self.enabled() {
            return;
        }

        let state = Rc::downgrade(&self.state);
        self.poller.extraction_enable(move |extracted| {
            debug!("Card identifier read from \"{}\"", extracted.reader_name);
            if let Some(state) = state.upgrade() {
                state.notify(SmartCardSource::identified_user(&extracted));
            }
        });

        self.state.set_enabled(true);
    }

    fn disable(&self) {
        if !self.enabled() {
            return;
        }

        self.poller.extraction_disable();
        self.state.set_enabled(false);
    }
}

impl Drop for SmartCardSource {
    fn drop(&mut self) {
        self.disable();
    }
}
