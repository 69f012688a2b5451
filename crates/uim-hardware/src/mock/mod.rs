//! Mock reader subsystem for testing and development.
//!
//! Readers and cards are attached and removed programmatically through a
//! handle, so the poller can be driven without PC/SC hardware.

pub mod card_reader;

pub use card_reader::{MockCard, MockCardReaders, MockCardReadersHandle, MockResponse, SUPPORTED_ATR};
