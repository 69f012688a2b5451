//! End-to-end tests of the smart card poller against the mock subsystem.

use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tokio::time::timeout;
use uim_hardware::mock::{MockCard, MockCardReaders, MockCardReadersHandle, MockResponse};
use uim_hardware::{ExtractedIdentifier, SmartCardPoller};

const TIMEOUT: Duration = Duration::from_secs(5);
const UID: [u8; 4] = [0x04, 0xa1, 0xb2, 0xc3];
const READER: &str = "ACS ACR122U PICC Interface 00 00";

fn enable(poller: &SmartCardPoller) -> mpsc::UnboundedReceiver<ExtractedIdentifier> {
    let (tx, rx) = mpsc::unbounded_channel();
    poller.extraction_enable(move |extracted| {
        let _ = tx.send(extracted);
    });
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<ExtractedIdentifier>) -> ExtractedIdentifier {
    timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for identifier")
        .expect("callback dropped")
}

/// Give queued identifiers a chance to be flushed.
async fn assert_nothing_delivered(rx: &mut mpsc::UnboundedReceiver<ExtractedIdentifier>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err(), "no identifier expected");
}

/// Change the mock and wait until the poller has handled it and blocks again.
fn apply(handle: &MockCardReadersHandle, change: impl FnOnce(&MockCardReadersHandle)) {
    let calls = handle.wait_calls();
    change(handle);
    assert!(handle.wait_until_waiting(calls + 1, TIMEOUT));
}

fn poller_with_reader() -> (SmartCardPoller, MockCardReadersHandle) {
    let (readers, handle) = MockCardReaders::new();
    handle.add_reader(READER);
    let poller = SmartCardPoller::new(readers);
    // The first wait reports the initial reader state, the second blocks.
    assert!(handle.wait_until_waiting(2, TIMEOUT));
    (poller, handle)
}

#[tokio::test]
async fn test_inserted_card_identifier_delivered() {
    LocalSet::new()
        .run_until(async {
            let (poller, handle) = poller_with_reader();
            let mut rx = enable(&poller);

            let (tx, mut threads) = mpsc::unbounded_channel();
            let consumer = std::thread::current().id();
            poller.extraction_enable(move |extracted| {
                let _ = tx.send((extracted, std::thread::current().id()));
            });

            handle.insert_card(READER, MockCard::with_uid(&UID));

            let (extracted, thread) = timeout(TIMEOUT, threads.recv()).await.unwrap().unwrap();
            assert_eq!(extracted.identifier, UID);
            assert_eq!(extracted.reader_name, READER);
            assert_eq!(thread, consumer);
            assert!(rx.try_recv().is_err(), "replaced callback must not be called");

            assert!(handle.wait_until_waiting(3, TIMEOUT));
            assert_eq!(handle.commands(), vec![vec![0xff, 0xca, 0x00, 0x00, 0x00]]);
            assert_eq!(handle.connections(), 1);
            assert_eq!(handle.disconnects(), 1);
        })
        .await;
}

#[tokio::test]
async fn test_reinserted_card_delivered_again() {
    LocalSet::new()
        .run_until(async {
            let (poller, handle) = poller_with_reader();
            let mut rx = enable(&poller);

            apply(&handle, |h| {
                h.insert_card(READER, MockCard::with_uid(&UID));
            });
            assert_eq!(next(&mut rx).await.identifier, UID);

            apply(&handle, |h| h.remove_card(READER));
            assert_nothing_delivered(&mut rx).await;

            handle.insert_card(READER, MockCard::with_uid(&[1, 2, 3, 4, 5, 6, 7]));
            assert_eq!(next(&mut rx).await.identifier, vec![1, 2, 3, 4, 5, 6, 7]);
        })
        .await;
}

#[tokio::test]
async fn test_card_present_at_startup_ignored() {
    LocalSet::new()
        .run_until(async {
            let (readers, handle) = MockCardReaders::new();
            handle.add_reader(READER);
            handle.insert_card(READER, MockCard::with_uid(&UID));

            let poller = SmartCardPoller::new(readers);
            let mut rx = enable(&poller);
            assert!(handle.wait_until_waiting(2, TIMEOUT));

            assert_nothing_delivered(&mut rx).await;
            assert_eq!(handle.connect_attempts(), 0);
        })
        .await;
}

#[tokio::test]
async fn test_extraction_disabled_skips_card() {
    LocalSet::new()
        .run_until(async {
            let (poller, handle) = poller_with_reader();
            assert!(!poller.is_extraction_enabled());

            apply(&handle, |h| {
                h.insert_card(READER, MockCard::with_uid(&UID));
            });

            assert_eq!(handle.connect_attempts(), 0);
        })
        .await;
}

#[tokio::test]
async fn test_extraction_disable_then_enable() {
    LocalSet::new()
        .run_until(async {
            let (poller, handle) = poller_with_reader();
            let mut rx = enable(&poller);
            poller.extraction_disable();
            assert!(!poller.is_extraction_enabled());

            apply(&handle, |h| {
                h.insert_card(READER, MockCard::with_uid(&UID));
            });
            assert_eq!(handle.connect_attempts(), 0);
            apply(&handle, |h| h.remove_card(READER));

            let mut rx_enabled = enable(&poller);
            handle.insert_card(READER, MockCard::with_uid(&UID));

            assert_eq!(next(&mut rx_enabled).await.identifier, UID);
            assert!(rx.try_recv().is_err());
        })
        .await;
}

#[tokio::test]
async fn test_unsupported_atr_not_read() {
    LocalSet::new()
        .run_until(async {
            let (poller, handle) = poller_with_reader();
            let mut rx = enable(&poller);

            apply(&handle, |h| {
                h.insert_card(
                    READER,
                    MockCard::with_uid(&UID).atr(&[0x3b, 0x80, 0x80, 0x01, 0x01]),
                );
            });

            assert_nothing_delivered(&mut rx).await;
            assert_eq!(handle.connect_attempts(), 0);
        })
        .await;
}

#[tokio::test]
async fn test_failed_reads_deliver_nothing_and_disconnect() {
    LocalSet::new()
        .run_until(async {
            let (poller, handle) = poller_with_reader();
            let mut rx = enable(&poller);

            let cards = [
                MockCard::with_response(vec![0x04, 0xa1, 0xb2, 0xc3, 0x6a, 0x82]),
                MockCard::with_response(vec![0x04, 0xa1, 0xb2, 0x90, 0x00]),
                MockCard::failing(MockResponse::TransmitError),
            ];
            for card in cards {
                apply(&handle, |h| {
                    h.insert_card(READER, card);
                });
                apply(&handle, |h| h.remove_card(READER));
            }

            assert_nothing_delivered(&mut rx).await;
            assert_eq!(handle.connections(), 3);
            assert_eq!(handle.disconnects(), 3);
        })
        .await;
}

#[tokio::test]
async fn test_refused_connection_delivers_nothing() {
    LocalSet::new()
        .run_until(async {
            let (poller, handle) = poller_with_reader();
            let mut rx = enable(&poller);

            apply(&handle, |h| {
                h.insert_card(READER, MockCard::failing(MockResponse::ConnectError));
            });

            assert_nothing_delivered(&mut rx).await;
            assert_eq!(handle.connect_attempts(), 1);
            assert_eq!(handle.connections(), 0);
        })
        .await;
}

#[tokio::test]
async fn test_hot_plugged_reader_watched() {
    LocalSet::new()
        .run_until(async {
            let (readers, handle) = MockCardReaders::new();
            let poller = SmartCardPoller::new(readers);
            let mut rx = enable(&poller);
            assert!(handle.wait_until_waiting(1, TIMEOUT));

            // Reader list change, then the new reader's initial state.
            handle.add_reader(READER);
            assert!(handle.wait_until_waiting(3, TIMEOUT));

            handle.insert_card(READER, MockCard::with_uid(&UID));
            let extracted = next(&mut rx).await;
            assert_eq!(extracted.reader_name, READER);
        })
        .await;
}

#[tokio::test]
async fn test_shutdown_retries_lost_cancels() {
    LocalSet::new()
        .run_until(async {
            let (poller, handle) = poller_with_reader();
            handle.lose_cancels(3);

            let started = Instant::now();
            drop(poller);

            assert!(handle.cancel_calls() >= 4);
            assert!(started.elapsed() < Duration::from_secs(2));
            assert_eq!(handle.contexts_released(), 1);
        })
        .await;
}

#[tokio::test]
async fn test_immediate_shutdown_terminates() {
    LocalSet::new()
        .run_until(async {
            let (readers, handle) = MockCardReaders::new();
            handle.add_reader(READER);

            let started = Instant::now();
            drop(SmartCardPoller::new(readers));

            assert!(started.elapsed() < Duration::from_secs(2));
            assert_eq!(handle.contexts_released(), handle.contexts_established());
        })
        .await;
}

#[tokio::test]
async fn test_unavailable_subsystem_is_inert() {
    LocalSet::new()
        .run_until(async {
            let (readers, handle) = MockCardReaders::unavailable();
            let poller = SmartCardPoller::new(readers);
            let mut rx = enable(&poller);

            assert_nothing_delivered(&mut rx).await;
            drop(poller);

            assert_eq!(handle.contexts_established(), 0);
            assert_eq!(handle.cancel_calls(), 0);
            assert_eq!(handle.wait_calls(), 0);
        })
        .await;
}

#[tokio::test]
async fn test_unavailable_backend_is_inert() {
    LocalSet::new()
        .run_until(async {
            let poller = SmartCardPoller::new(uim_hardware::UnavailableSubsystem);
            let mut rx = enable(&poller);
            assert_nothing_delivered(&mut rx).await;
        })
        .await;
}
