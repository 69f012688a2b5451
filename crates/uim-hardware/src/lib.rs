//! Smart card reader access for the user identification manager.
//!
//! The crate is split along the boundary between the platform's reader
//! subsystem and the identification logic:
//!
//! - [`traits`] abstracts the reader subsystem (PC/SC or a mock).
//! - [`poller`] runs the background thread that watches readers and reads
//!   card UIDs with the `Get Data` command described in [`apdu`].
//! - [`idle_queue`] carries results from that thread to the consumer
//!   context, where callbacks run.
//!
//! # Example
//!
//! ```no_run
//! use uim_hardware::mock::{MockCard, MockCardReaders};
//! use uim_hardware::SmartCardPoller;
//!
//! # async fn example() {
//! let local = tokio::task::LocalSet::new();
//! local
//!     .run_until(async {
//!         let (readers, handle) = MockCardReaders::new();
//!         handle.add_reader("Reader 0");
//!
//!         let poller = SmartCardPoller::new(readers);
//!         poller.extraction_enable(|extracted| {
//!             println!("{:02x?} from {}", extracted.identifier, extracted.reader_name);
//!         });
//!
//!         handle.insert_card("Reader 0", MockCard::with_uid(&[0x04, 0xa1, 0xb2, 0xc3]));
//!     })
//!     .await;
//! # }
//! ```

pub mod apdu;
pub mod error;
pub mod idle_queue;
pub mod mock;
#[cfg(feature = "hardware-pcsc")]
pub mod pcsc;
pub mod poller;
pub mod traits;
pub mod types;
pub mod unavailable;

pub use error::{HardwareError, Result};
pub use idle_queue::{IdleQueue, IdleQueueSender};
pub use poller::SmartCardPoller;
pub use traits::{CardConnection, CardReaderSubsystem, ReaderContext, WaitCanceller};
pub use types::{ExtractedIdentifier, ReaderState, ReaderStatus};
pub use unavailable::UnavailableSubsystem;
