#![forbid(unsafe_code)]

//! Observation of arrays whose elements are themselves arrays.
//!
//! [`NestedArrayObserver`] runs an [`ArrayChangeObserver`] over the outer
//! array and, for each inner array that shows up, subscribes a
//! [`BoundObserver`] to that inner array's contents. The bound observer is
//! invoked once as soon as the inner array is added, and again after every
//! mutation of it. When the inner array leaves the outer array its
//! subscription is dropped.
//!
//! Bookkeeping lives in a cache owned by the per-instance callbacks, so two
//! owners sharing an inner array never see or release each other's entries.
//! Entries count occurrences: an inner array present twice stays observed
//! until its last occurrence is removed. When the outer array itself is
//! replaced, every entry is dropped regardless of the
//! [`ReplacementPolicy`], so no inner array outlives its outer array's
//! watch.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use weft_core::array::{ArrayId, ObservableArray};
use weft_core::class::{Class, Mixin};
use weft_core::error::{Result, WeftError};
use weft_core::owner::{Owner, WeakOwner};
use weft_core::subscription::Subscription;
use weft_core::value::Value;

use crate::array_observer::{ArrayCallbacks, ArrayChangeObserver, ReplacementPolicy};

/// Callback run with an inner array whenever it is attached or changes.
pub type NestedFn = dyn Fn(&Owner, &ObservableArray) -> Result<()>;

/// A callback curried with the owner and inner array it was bound for.
#[derive(Clone)]
pub struct BoundObserver {
    owner: WeakOwner,
    target: ObservableArray,
    callback: Rc<NestedFn>,
}

impl fmt::Debug for BoundObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundObserver")
            .field("owner", &self.owner)
            .field("target", &self.target.id())
            .finish()
    }
}

impl BoundObserver {
    #[must_use]
    pub fn target(&self) -> &ObservableArray {
        &self.target
    }

    pub fn invoke(&self) -> Result<()> {
        let owner = self.owner.upgrade().ok_or(WeftError::OwnerDropped)?;
        (self.callback)(&owner, &self.target)
    }
}

struct CacheEntry {
    bound: BoundObserver,
    occurrences: usize,
    _subscription: Subscription,
}

/// Per-owner callbacks for the outer array.
struct NestedCallbacks {
    key: String,
    callback: Rc<NestedFn>,
    cache: RefCell<AHashMap<ArrayId, CacheEntry>>,
}

impl ArrayCallbacks for NestedCallbacks {
    fn added(&self, owner: &Owner, item: &Value, index: usize) -> Result<()> {
        let Some(inner) = item.as_array() else {
            return Err(WeftError::NestedNotArray {
                key: self.key.clone(),
                index,
                found: item.describe(),
            });
        };

        let bound = {
            let mut cache = self.cache.borrow_mut();
            if let Some(entry) = cache.get_mut(&inner.id()) {
                entry.occurrences += 1;
                entry.bound.clone()
            } else {
                let bound = BoundObserver {
                    owner: owner.downgrade(),
                    target: inner.clone(),
                    callback: Rc::clone(&self.callback),
                };
                let on_change = bound.clone();
                let subscription = inner.on_change(move |_| on_change.invoke());
                cache.insert(
                    inner.id(),
                    CacheEntry {
                        bound: bound.clone(),
                        occurrences: 1,
                        _subscription: subscription,
                    },
                );
                bound
            }
        };

        tracing::debug!(
            message = "weft.nested.bind",
            owner = owner.id(),
            key = %self.key,
            target = inner.id().raw(),
            index
        );
        bound.invoke()
    }

    fn removed(&self, owner: &Owner, item: &Value, index: usize) -> Result<()> {
        let Some(inner) = item.as_array() else {
            return Ok(());
        };

        let released = {
            let mut cache = self.cache.borrow_mut();
            let remaining = match cache.get_mut(&inner.id()) {
                None => {
                    tracing::debug!(
                        message = "weft.nested.miss",
                        owner = owner.id(),
                        key = %self.key,
                        target = inner.id().raw(),
                        index
                    );
                    return Ok(());
                }
                Some(entry) => {
                    entry.occurrences -= 1;
                    entry.occurrences
                }
            };
            if remaining == 0 {
                cache.remove(&inner.id())
            } else {
                None
            }
        };

        if let Some(entry) = released {
            tracing::debug!(
                message = "weft.nested.unbind",
                owner = owner.id(),
                key = %self.key,
                target = entry.bound.target().id().raw(),
                index
            );
        }
        Ok(())
    }

    fn released(&self, owner: &Owner, outer: &ObservableArray) -> Result<()> {
        let dropped = std::mem::take(&mut *self.cache.borrow_mut());
        if !dropped.is_empty() {
            tracing::debug!(
                message = "weft.nested.release",
                owner = owner.id(),
                key = %self.key,
                outer = outer.id().raw(),
                unbound = dropped.len()
            );
        }
        Ok(())
    }
}

/// Observer over an array of arrays.
///
/// `callback(owner, inner)` runs once when `inner` enters the outer array
/// (including the contents present at attach) and after every mutation of
/// `inner` while it remains there.
#[derive(Clone, Debug)]
pub struct NestedArrayObserver {
    outer: ArrayChangeObserver,
}

impl NestedArrayObserver {
    pub fn new(
        key: impl Into<String>,
        callback: impl Fn(&Owner, &ObservableArray) -> Result<()> + 'static,
    ) -> Self {
        let key = key.into();
        let callback: Rc<NestedFn> = Rc::new(callback);
        let cache_key = key.clone();
        let outer = ArrayChangeObserver::with_factory(key, move |_| NestedCallbacks {
            key: cache_key.clone(),
            callback: Rc::clone(&callback),
            cache: RefCell::new(AHashMap::new()),
        });
        Self { outer }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReplacementPolicy) -> Self {
        self.outer = self.outer.with_policy(policy);
        self
    }

    #[must_use]
    pub fn key(&self) -> &str {
        self.outer.key()
    }

    pub fn attach(&self, owner: &Owner) -> Result<()> {
        self.outer.attach(owner)
    }
}

impl Mixin for NestedArrayObserver {
    fn install(self, class: &mut Class) {
        self.outer.install(class);
    }
}
