//! Aggregation of identification sources.
//!
//! The [`SourceGroup`] is the interface through which the rest of the
//! daemon interacts with identification sources. It owns a fixed, ordered
//! set of sources and registers itself as their listener. Every user any
//! source identifies is logged, appended to a bounded history and passed
//! on to the group's subscribers.
//!
//! ```text
//! ┌───────────┐
//! │ SCARD     │──┐
//! └───────────┘  │   ┌─────────────┐   history (last N)
//!                ├──►│ SourceGroup │──────────────────► subscribers
//! ┌───────────┐  │   └─────────────┘
//! │ MSD       │──┘
//! └───────────┘
//! ```
//!
//! The group lives on the consumer context only.

use crate::source::{IdentificationListener, IdentificationSource};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use tracing::{info, warn};
use uim_core::IdentifiedUser;

type Subscriber = Rc<dyn Fn(&IdentifiedUser)>;

/// Handle identifying one subscription to a [`SourceGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Owner of all identification sources.
pub struct SourceGroup {
    sources: Vec<Box<dyn IdentificationSource>>,
    capacity: usize,
    history: RefCell<VecDeque<IdentifiedUser>>,
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: Cell<u64>,
}

impl SourceGroup {
    /// Take ownership of `sources` and become their listener.
    ///
    /// At most `capacity` identified users are remembered.
    pub fn new(sources: Vec<Box<dyn IdentificationSource>>, capacity: usize) -> Rc<Self> {
        let group = Rc::new(Self {
            sources,
            capacity,
            history: RefCell::new(VecDeque::with_capacity(capacity)),
            subscribers: RefCell::new(Vec::new()),
            next_subscription: Cell::new(0),
        });

        let weak = Rc::downgrade(&group);
        let listener: Weak<dyn IdentificationListener> = weak;
        for source in &group.sources {
            source.set_listener(listener.clone());
        }

        group
    }

    /// Names of the enabled sources, in registration order.
    pub fn enabled_names(&self) -> Vec<String> {
        self.names_where(true)
    }

    /// Names of the disabled sources, in registration order.
    pub fn disabled_names(&self) -> Vec<String> {
        self.names_where(false)
    }

    pub fn enable_all(&self) {
        for source in &self.sources {
            source.enable();
        }
    }

    pub fn disable_all(&self) {
        for source in &self.sources {
            source.disable();
        }
    }

    /// Enable exactly the sources named in `names`, or all of them if
    /// `names` is empty.
    ///
    /// Names are matched ignoring ASCII case. Unknown names are logged and
    /// skipped.
    pub fn enable<S: AsRef<str>>(&self, names: &[S]) {
        if names.is_empty() {
            self.enable_all();
            return;
        }

        self.disable_all();

        for name in names {
            let name = name.as_ref();
            match self.find_source(name) {
                Some(source) => source.enable(),
                None => warn!("Can not enable \"{}\", unknown source", name),
            }
        }
    }

    /// Most recently identified users, oldest first.
    pub fn identified_users(&self) -> Vec<IdentifiedUser> {
        self.history.borrow().iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Call `subscriber` for every user identified from now on.
    pub fn subscribe(&self, subscriber: impl Fn(&IdentifiedUser) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);

        self.subscribers.borrow_mut().push((id, Rc::new(subscriber)));
        id
    }

    /// Remove a subscription. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(subscription, _)| *subscription != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    fn names_where(&self, enabled: bool) -> Vec<String> {
        self.sources
            .iter()
            .filter(|source| source.enabled() == enabled)
            .map(|source| source.name().to_string())
            .collect()
    }

    fn find_source(&self, name: &str) -> Option<&dyn IdentificationSource> {
        self.sources
            .iter()
            .find(|source| source.name().eq_ignore_ascii_case(name))
            .map(|source| &**source)
    }

    fn remember(&self, user: &IdentifiedUser) {
        let mut history = self.history.borrow_mut();

        while history.len() >= self.capacity && history.pop_front().is_some() {}

        if self.capacity > 0 {
            history.push_back(user.clone());
        }
    }
}

impl IdentificationListener for SourceGroup {
    fn user_identified(&self, user: IdentifiedUser) {
        info!(
            "User identified, user identification id: {}, seat id: {}",
            user.identification_id(),
            user.seat_id()
        );

        self.remember(&user);

        // Subscribers may subscribe or unsubscribe while being called.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, subscriber)| Rc::clone(subscriber))
            .collect();

        for subscriber in subscribers {
            subscriber(&user);
        }
    }
}

impl Drop for SourceGroup {
    fn drop(&mut self) {
        for source in &self.sources {
            source.clear_listener();
        }
    }
}

impl std::fmt::Debug for SourceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceGroup")
            .field("enabled", &self.enabled_names())
            .field("disabled", &self.disabled_names())
            .field("identified_users", &self.history.borrow().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
