//! Identification source abstraction.
//!
//! A source is one mechanism able to identify users. Sources start
//! disabled; while enabled they report every identified user to the one
//! listener registered with them. Normally that listener is the
//! [`SourceGroup`](crate::group::SourceGroup) owning the source.
//!
//! All methods take `&self`: enabling a source may synchronously report
//! users to its listener, which in turn may call back into sources.

use std::cell::{Cell, RefCell};
use std::rc::Weak;
use uim_core::IdentifiedUser;

/// Receives users identified by a source.
pub trait IdentificationListener {
    fn user_identified(&self, user: IdentifiedUser);
}

/// Name, enabled flag and listener slot every source carries.
///
/// Sources share it (behind an `Rc`) with the tasks and callbacks that
/// report identifications.
pub struct SourceState {
    name: String,
    enabled: Cell<bool>,
    listener: RefCell<Option<Weak<dyn IdentificationListener>>>,
}

impl SourceState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: Cell::new(false),
            listener: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn set_listener(&self, listener: Weak<dyn IdentificationListener>) {
        *self.listener.borrow_mut() = Some(listener);
    }

    pub fn clear_listener(&self) {
        *self.listener.borrow_mut() = None;
    }

    /// Report `user` to the listener, if one is registered and alive.
    pub fn notify(&self, user: IdentifiedUser) {
        let listener = self.listener.borrow().as_ref().and_then(Weak::upgrade);

        if let Some(listener) = listener {
            listener.user_identified(user);
        }
    }
}

impl std::fmt::Debug for SourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceState")
            .field("name", &self.name)
            .field("enabled", &self.enabled.get())
            .field("has_listener", &self.listener.borrow().is_some())
            .finish()
    }
}

/// One identification mechanism.
pub trait IdentificationSource {
    fn state(&self) -> &SourceState;

    /// Activate the mechanism. Does nothing if already enabled.
    fn enable(&self);

    /// Deactivate the mechanism and release what `enable` acquired. Does
    /// nothing if already disabled.
    fn disable(&self);

    /// Stable name, compared case-insensitively.
    fn name(&self) -> &str {
        self.state().name()
    }

    fn enabled(&self) -> bool {
        self.state().enabled()
    }

    fn set_listener(&self, listener: Weak<dyn IdentificationListener>) {
        self.state().set_listener(listener);
    }

    fn clear_listener(&self) {
        self.state().clear_listener();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use uim_core::SeatId;

    #[derive(Default)]
    struct Recorder {
        users: RefCell<Vec<IdentifiedUser>>,
    }

    impl IdentificationListener for Recorder {
        fn user_identified(&self, user: IdentifiedUser) {
            self.users.borrow_mut().push(user);
        }
    }

    #[test]
    fn test_disabled_by_default() {
        let state = SourceState::new("TEST");
        assert_eq!(state.name(), "TEST");
        assert!(!state.enabled());
    }

    #[test]
    fn test_notify_reaches_listener() {
        let state = SourceState::new("TEST");
        let recorder = Rc::new(Recorder::default());
        let weak: Weak<Recorder> = Rc::downgrade(&recorder);
        state.set_listener(weak);

        let user = IdentifiedUser::tagged("TEST", "1", SeatId::new(1));
        state.notify(user.clone());

        assert_eq!(*recorder.users.borrow(), vec![user]);
    }

    #[test]
    fn test_notify_without_listener_is_noop() {
        let state = SourceState::new("TEST");
        state.notify(IdentifiedUser::tagged("TEST", "1", SeatId::MAIN_USER));

        let recorder = Rc::new(Recorder::default());
        let weak: Weak<Recorder> = Rc::downgrade(&recorder);
        state.set_listener(weak);
        state.clear_listener();
        state.notify(IdentifiedUser::tagged("TEST", "2", SeatId::MAIN_USER));

        assert!(recorder.users.borrow().is_empty());
    }

    #[test]
    fn test_notify_after_listener_dropped() {
        let state = SourceState::new("TEST");
        let recorder = Rc::new(Recorder::default());
        let weak: Weak<Recorder> = Rc::downgrade(&recorder);
        state.set_listener(weak);
        drop(recorder);

        state.notify(IdentifiedUser::tagged("TEST", "1", SeatId::MAIN_USER));
    }
}
