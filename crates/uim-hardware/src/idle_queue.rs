//! Queue handing values from any thread to the consumer context.
//!
//! Producers push through an [`IdleQueueSender`], which can be cloned and
//! moved to other threads. The [`IdleQueue`] itself lives on the consumer
//! context (a tokio `LocalSet`) and owns a local task that flushes pushed
//! values into a callback. Pushes made before the flush task gets to run
//! are coalesced into one flush, delivered in push order.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

type Callback<T> = Box<dyn FnMut(T)>;

struct Pending<T> {
    values: Vec<T>,
    flush_scheduled: bool,
    closed: bool,
}

struct Shared<T> {
    pending: Mutex<Pending<T>>,
    flush: Notify,
}

impl<T> Shared<T> {
    fn pending(&self) -> MutexGuard<'_, Pending<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, value: T) {
        let mut pending = self.pending();
        if pending.closed {
            return;
        }

        pending.values.push(value);
        if !pending.flush_scheduled {
            pending.flush_scheduled = true;
            self.flush.notify_one();
        }
    }

    fn take(&self) -> Vec<T> {
        let mut pending = self.pending();
        pending.flush_scheduled = false;
        std::mem::take(&mut pending.values)
    }

    fn is_closed(&self) -> bool {
        self.pending().closed
    }
}

/// Callback slot living on the consumer context.
///
/// The callback is taken out while it runs, so it may replace or clear
/// itself. The generation tells whether that happened.
struct CallbackSlot<T> {
    callback: RefCell<Option<Callback<T>>>,
    generation: Cell<u64>,
}

impl<T> CallbackSlot<T> {
    fn replace(&self, callback: Option<Callback<T>>) {
        self.generation.set(self.generation.get().wrapping_add(1));
        // Drop the previous callback after releasing the borrow, its
        // destructor may touch the slot.
        let previous = self.callback.replace(callback);
        drop(previous);
    }

    fn invoke(&self, value: T) {
        let Some(mut callback) = self.callback.borrow_mut().take() else {
            return;
        };
        let generation = self.generation.get();

        callback(value);

        if self.generation.get() == generation {
            *self.callback.borrow_mut() = Some(callback);
        }
    }
}

/// Sending half of an [`IdleQueue`].
pub struct IdleQueueSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> IdleQueueSender<T> {
    /// Append `value` and schedule a flush if none is pending.
    ///
    /// Values pushed after the queue was dropped are discarded.
    pub fn push(&self, value: T) {
        self.shared.push(value);
    }
}

impl<T> Clone for IdleQueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Consumer half, delivering pushed values to a callback on the local task
/// set it was created on.
pub struct IdleQueue<T: 'static> {
    shared: Arc<Shared<T>>,
    slot: Rc<CallbackSlot<T>>,
    flush_task: JoinHandle<()>,
}

impl<T: Send + 'static> IdleQueue<T> {
    /// Create a queue whose flush task runs on the current `LocalSet`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a `LocalSet`.
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending {
                values: Vec::new(),
                flush_scheduled: false,
                closed: false,
            }),
            flush: Notify::new(),
        });
        let slot = Rc::new(CallbackSlot {
            callback: RefCell::new(None),
            generation: Cell::new(0),
        });

        let flush_task = tokio::task::spawn_local(flush_loop(Arc::clone(&shared), Rc::clone(&slot)));

        Self {
            shared,
            slot,
            flush_task,
        }
    }

    pub fn sender(&self) -> IdleQueueSender<T> {
        IdleQueueSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Push from the consumer context itself.
    pub fn push(&self, value: T) {
        self.shared.push(value);
    }

    /// Install the callback receiving flushed values, replacing any
    /// previous one. Takes effect even when called from within the
    /// callback.
    pub fn set_callback(&self, callback: impl FnMut(T) + 'static) {
        self.slot.replace(Some(Box::new(callback)));
    }

    /// Remove the callback. Values flushed without a callback are dropped.
    pub fn clear_callback(&self) {
        self.slot.replace(None);
    }
}

impl<T: 'static> Drop for IdleQueue<T> {
    fn drop(&mut self) {
        {
            let mut pending = self.shared.pending();
            pending.closed = true;
            pending.values.clear();
        }
        self.slot.replace(None);
        self.flush_task.abort();
    }
}

async fn flush_loop<T>(shared: Arc<Shared<T>>, slot: Rc<CallbackSlot<T>>) {
    loop {
        shared.flush.notified().await;

        for value in shared.take() {
            if shared.is_closed() {
                return;
            }
            slot.invoke(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::LocalSet;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for flush")
            .expect("callback dropped")
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_values_delivered_in_order_after_yield() {
        LocalSet::new()
            .run_until(async {
                let queue = IdleQueue::new();
                let (tx, mut rx) = mpsc::unbounded_channel();
                queue.set_callback(move |value: u32| tx.send(value).unwrap());

                queue.push(1);
                queue.push(2);
                queue.push(3);
                assert!(rx.try_recv().is_err(), "delivery must be deferred");

                assert_eq!(recv(&mut rx).await, 1);
                assert_eq!(recv(&mut rx).await, 2);
                assert_eq!(recv(&mut rx).await, 3);
            })
            .await;
    }

    #[tokio::test]
    async fn test_callback_runs_on_consumer_thread() {
        LocalSet::new()
            .run_until(async {
                let queue = IdleQueue::new();
                let (tx, mut rx) = mpsc::unbounded_channel();
                queue.set_callback(move |value: u32| {
                    tx.send((value, std::thread::current().id())).unwrap()
                });

                let sender = queue.sender();
                let producer = std::thread::spawn(move || {
                    for value in 0..100 {
                        sender.push(value);
                    }
                });
                producer.join().unwrap();

                let consumer = std::thread::current().id();
                for expected in 0..100 {
                    let (value, thread) = recv(&mut rx).await;
                    assert_eq!(value, expected);
                    assert_eq!(thread, consumer);
                }
            })
            .await;
    }

    #[tokio::test]
    async fn test_push_from_callback_delivered_in_later_flush() {
        LocalSet::new()
            .run_until(async {
                let queue = IdleQueue::new();
                let sender = queue.sender();
                let (tx, mut rx) = mpsc::unbounded_channel();
                queue.set_callback(move |value: u32| {
                    if value == 1 {
                        sender.push(2);
                    }
                    tx.send(value).unwrap();
                });

                queue.push(1);

                assert_eq!(recv(&mut rx).await, 1);
                assert_eq!(recv(&mut rx).await, 2);
            })
            .await;
    }

    #[tokio::test]
    async fn test_clear_callback_drops_values() {
        LocalSet::new()
            .run_until(async {
                let queue = IdleQueue::new();
                let (tx, mut rx) = mpsc::unbounded_channel();
                queue.set_callback(move |value: u32| tx.send(value).unwrap());
                queue.clear_callback();

                queue.push(1);
                settle().await;

                assert!(rx.try_recv().is_err());
            })
            .await;
    }

    #[tokio::test]
    async fn test_callback_can_clear_itself() {
        LocalSet::new()
            .run_until(async {
                let queue = Rc::new(IdleQueue::new());
                let delivered = Rc::new(RefCell::new(Vec::new()));

                let weak = Rc::downgrade(&queue);
                let seen = Rc::clone(&delivered);
                queue.set_callback(move |value: u32| {
                    seen.borrow_mut().push(value);
                    if let Some(queue) = weak.upgrade() {
                        queue.clear_callback();
                    }
                });

                queue.push(1);
                queue.push(2);
                settle().await;

                assert_eq!(*delivered.borrow(), vec![1]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_replaced_callback_receives_rest_of_flush() {
        LocalSet::new()
            .run_until(async {
                let queue = Rc::new(IdleQueue::new());
                let (tx, mut rx) = mpsc::unbounded_channel();

                let weak = Rc::downgrade(&queue);
                let first_tx = tx.clone();
                queue.set_callback(move |value: u32| {
                    first_tx.send(("first", value)).unwrap();
                    if let Some(queue) = weak.upgrade() {
                        let tx = tx.clone();
                        queue.set_callback(move |value| tx.send(("second", value)).unwrap());
                    }
                });

                queue.push(1);
                queue.push(2);

                assert_eq!(recv(&mut rx).await, ("first", 1));
                assert_eq!(recv(&mut rx).await, ("second", 2));
            })
            .await;
    }

    #[tokio::test]
    async fn test_no_delivery_after_drop() {
        LocalSet::new()
            .run_until(async {
                let queue = IdleQueue::new();
                let sender = queue.sender();
                let (tx, mut rx) = mpsc::unbounded_channel();
                queue.set_callback(move |value: u32| tx.send(value).unwrap());

                queue.push(1);
                drop(queue);
                sender.push(2);
                settle().await;

                assert!(rx.try_recv().is_err());
            })
            .await;
    }

    proptest! {
        #[test]
        fn prop_delivers_all_values_in_push_order(values in prop::collection::vec(any::<u16>(), 0..64)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let delivered = LocalSet::new().block_on(&runtime, {
                let values = values.clone();
                async move {
                    let queue = IdleQueue::new();
                    let (tx, mut rx) = mpsc::unbounded_channel();
                    queue.set_callback(move |value: u16| tx.send(value).unwrap());

                    let count = values.len();
                    let sender = queue.sender();
                    let producer = std::thread::spawn(move || {
                        for value in values {
                            sender.push(value);
                        }
                    });
                    producer.join().unwrap();

                    let mut delivered = Vec::with_capacity(count);
                    for _ in 0..count {
                        delivered.push(recv(&mut rx).await);
                    }
                    settle().await;
                    assert!(rx.try_recv().is_err());
                    delivered
                }
            });

            prop_assert_eq!(delivered, values);
        }
    }
}
