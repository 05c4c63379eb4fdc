#![forbid(unsafe_code)]

//! Subscription guards and the weak observer lists behind them.
//!
//! Observers are stored as `Weak` pointers by whatever they observe. The
//! only strong reference lives in the [`Subscription`] returned to the
//! caller, so dropping the guard deregisters the observer immediately:
//! dead entries are skipped by every later notification and pruned lazily.
//!
//! # Invariants
//!
//! 1. Observers are notified in registration order.
//! 2. Once a [`Subscription`] is dropped, its observer is never invoked again.
//! 3. [`ObserverList::live_count`] never counts a dropped observer.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// RAII guard keeping an observer registered.
///
/// Dropping the guard (or calling [`unsubscribe`](Self::unsubscribe))
/// removes the observer.
#[must_use = "dropping a Subscription deregisters the observer"]
pub struct Subscription {
    guard: Box<dyn Any>,
}

impl Subscription {
    pub(crate) fn new<T: ?Sized + 'static>(observer: Rc<T>) -> Self {
        Self {
            guard: Box::new(observer),
        }
    }

    /// Deregister the observer now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Registration-ordered list of weakly held observers.
pub(crate) struct ObserverList<T: ?Sized> {
    entries: RefCell<Vec<Weak<T>>>,
}

impl<T: ?Sized + 'static> ObserverList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Register `observer` and hand back the guard that keeps it alive.
    pub(crate) fn register(&self, observer: Rc<T>) -> Subscription {
        self.entries.borrow_mut().push(Rc::downgrade(&observer));
        Subscription::new(observer)
    }

    /// Upgrade every live observer, pruning the dead ones.
    ///
    /// The returned snapshot is detached from the list, so observers may
    /// subscribe or unsubscribe while it is being walked.
    pub(crate) fn live(&self) -> Vec<Rc<T>> {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|w| w.strong_count() > 0);
        entries.iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}
