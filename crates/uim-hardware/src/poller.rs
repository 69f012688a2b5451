//! Background smart card poller.
//!
//! A [`SmartCardPoller`] owns one OS thread that establishes a reader
//! subsystem context and then loops on blocking status waits. Whenever a
//! card is inserted into a reader that was known to be empty and
//! extraction is enabled, the card's UID is read with a `Get Data` command
//! and handed to the consumer context through an [`IdleQueue`].
//!
//! Shutdown happens in [`Drop`]: the stop flag is raised and the pending
//! status wait is cancelled. A cancel request can be lost if it arrives
//! before the thread actually blocks, so cancelling is retried at a fixed
//! interval for as long as the thread reports itself cancellable.

use crate::apdu;
use crate::error::{HardwareError, Result};
use crate::idle_queue::{IdleQueue, IdleQueueSender};
use crate::traits::{CardConnection, CardReaderSubsystem, ReaderContext, WaitCanceller};
use crate::types::{ExtractedIdentifier, ReaderStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Interval between two cancel attempts during shutdown.
pub const CANCEL_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Delay before listing readers again after the reader list changed.
pub const READER_LIST_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Pause after a failed status wait before the next one.
const WAIT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Index of the reader list notification entry in the status list.
const NOTIFICATION_INDEX: usize = 0;

struct RunStatus {
    stop: bool,
    cancellable: bool,
    canceller: Option<Box<dyn WaitCanceller>>,
}

struct Shared {
    run_status: Mutex<RunStatus>,
    cancelled: Condvar,
    extract: AtomicBool,
}

impl Shared {
    fn run_status(&self) -> MutexGuard<'_, RunStatus> {
        self.run_status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Watches all attached card readers and extracts card identifiers.
///
/// Created on the consumer context (inside a tokio `LocalSet`); the
/// extraction callback always runs there.
pub struct SmartCardPoller {
    shared: Arc<Shared>,
    queue: IdleQueue<ExtractedIdentifier>,
    thread: Option<JoinHandle<()>>,
}

impl SmartCardPoller {
    /// Start polling the readers of `subsystem`. Extraction starts disabled.
    ///
    /// If the subsystem context cannot be established the poller stays
    /// inert: it never delivers anything and drops cleanly.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio `LocalSet`.
    pub fn new<S: CardReaderSubsystem>(subsystem: S) -> Self {
        let queue = IdleQueue::new();
        let shared = Arc::new(Shared {
            run_status: Mutex::new(RunStatus {
                stop: false,
                cancellable: false,
                canceller: None,
            }),
            cancelled: Condvar::new(),
            extract: AtomicBool::new(false),
        });

        let thread = std::thread::Builder::new()
            .name("uim-card-poller".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                let sender = queue.sender();
                move || poll_readers(subsystem, &shared, &sender)
            });

        let thread = match thread {
            Ok(thread) => Some(thread),
            Err(e) => {
                error!("Failed to start card poller thread: {}", e);
                None
            }
        };

        Self {
            shared,
            queue,
            thread,
        }
    }

    /// Enable extraction, delivering identifiers of newly inserted cards to
    /// `callback` on the consumer context.
    pub fn extraction_enable(&self, callback: impl FnMut(ExtractedIdentifier) + 'static) {
        self.shared.extract.store(true, Ordering::SeqCst);
        self.queue.set_callback(callback);
    }

    /// Disable extraction. Already queued identifiers are dropped.
    pub fn extraction_disable(&self) {
        self.queue.clear_callback();
        self.shared.extract.store(false, Ordering::SeqCst);
    }

    pub fn is_extraction_enabled(&self) -> bool {
        self.shared.extract.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        {
            let mut status = self.shared.run_status();
            status.stop = true;

            let mut attempts = 0u32;
            while status.cancellable {
                if let Some(canceller) = status.canceller.as_ref()
                    && let Err(e) = canceller.cancel()
                {
                    debug!("Failed to cancel status wait: {}", e);
                }
                attempts += 1;

                status = match self.shared.cancelled.wait_timeout(status, CANCEL_RETRY_INTERVAL) {
                    Ok((status, _)) => status,
                    Err(poisoned) => poisoned.into_inner().0,
                };
            }

            if attempts > 1 {
                debug!(attempts, "Status wait cancelled after retries");
            }
        }

        if thread.join().is_err() {
            error!("Card poller thread panicked");
        }
    }
}

impl Drop for SmartCardPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_readers<S: CardReaderSubsystem>(
    subsystem: S,
    shared: &Shared,
    sender: &IdleQueueSender<ExtractedIdentifier>,
) {
    let mut context = match subsystem.establish_context() {
        Ok(context) => context,
        Err(e) => {
            warn!("Card reader subsystem unavailable, smart cards disabled: {}", e);
            return;
        }
    };
    shared.run_status().canceller = Some(Box::new(context.canceller()));

    let mut states = watched_readers(&mut context);

    loop {
        {
            let mut status = shared.run_status();
            if status.stop {
                break;
            }
            status.cancellable = true;
        }

        let result = context.wait_for_status_change(&mut states);

        {
            let mut status = shared.run_status();
            status.cancellable = false;
            if status.stop {
                shared.cancelled.notify_all();
                break;
            }
        }

        if let Err(e) = result {
            if !e.is_cancelled() {
                warn!("Failed to wait for reader status change: {}", e);
                std::thread::sleep(WAIT_ERROR_BACKOFF);
            }
            continue;
        }

        for status in states.iter_mut() {
            if !status.is_reader_list_notification() && status.card_inserted() {
                card_inserted(&mut context, status, shared, sender);
            }
            status.sync_current_state();
        }

        if states[NOTIFICATION_INDEX].changed() {
            std::thread::sleep(READER_LIST_SETTLE_DELAY);
            states = watched_readers(&mut context);
        }
    }

    // The context is released once the last canceller clone is gone.
    shared.run_status().canceller = None;
    drop(context);
    debug!("Card poller stopped");
}

/// Build the status list: the notification entry, then every reader.
fn watched_readers<C: ReaderContext>(context: &mut C) -> Vec<ReaderStatus> {
    let mut states = vec![ReaderStatus::reader_list_notification()];

    match context.list_readers() {
        Ok(readers) => {
            info!(count = readers.len(), "Watching card readers");
            for reader in readers {
                debug!("Watching reader \"{}\"", reader);
                states.push(ReaderStatus::new(reader));
            }
        }
        Err(e) => warn!("Failed to list card readers: {}", e),
    }

    states
}

fn card_inserted<C: ReaderContext>(
    context: &mut C,
    status: &ReaderStatus,
    shared: &Shared,
    sender: &IdleQueueSender<ExtractedIdentifier>,
) {
    debug!("Card inserted into \"{}\"", status.name());

    if !shared.extract.load(Ordering::SeqCst) {
        return;
    }

    if let Err(e) = apdu::ensure_get_data_supported(status.atr()) {
        warn!("Can not read identifier from card in \"{}\": {}", status.name(), e);
        return;
    }

    match read_identifier(context, status.name()) {
        Ok(identifier) => sender.push(ExtractedIdentifier {
            identifier,
            reader_name: status.name().to_string(),
        }),
        Err(e) => warn!("Failed to read identifier from card in \"{}\": {}", status.name(), e),
    }
}

/// Connect, send `Get Data` and disconnect again, whatever the outcome.
fn read_identifier<C: ReaderContext>(context: &mut C, reader: &str) -> Result<Vec<u8>> {
    let mut card = context.connect(reader)?;

    let mut response = [0u8; apdu::RESPONSE_MAX_LENGTH];
    let received = card.transmit(&apdu::GET_DATA_UID_COMMAND, &mut response)?;
    let response = response
        .get(..received)
        .ok_or_else(|| HardwareError::invalid_data(format!("Reported {received} response bytes")))?;

    apdu::parse_get_data_response(response)
}
