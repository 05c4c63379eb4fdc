#![forbid(unsafe_code)]

//! Owner instances: keyed slots, computed accessors, and key observers.
//!
//! An [`Owner`] is the object on which dependent keys and derived
//! properties live. Handles are cheap to clone and all refer to the same
//! instance. Machinery that must live exactly as long as the instance (array
//! registrations, per-instance caches) is handed to [`Owner::retain`], and
//! captures a [`WeakOwner`] so the instance never keeps itself alive.
//!
//! # Invariants
//!
//! 1. Key observers fire only on reference-level change: assigning a value
//!    strictly equal to the current one is a no-op.
//! 2. Key observers run synchronously, in registration order, after the new
//!    value is stored.
//! 3. A computed slot's setter result is what [`Owner::set`] returns.
//! 4. [`Owner::mark_attached`] returns `true` at most once per token.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::{AHashMap, AHashSet};

use crate::computed::ComputedProperty;
use crate::error::{Result, WeftError};
use crate::subscription::{ObserverList, Subscription};
use crate::value::Value;

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_ATTACH_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Reference-level observer: `(owner, key)` after `key` was reassigned.
pub type KeyObserver = dyn Fn(&Owner, &str) -> Result<()>;

/// Identifies one piece of per-instance machinery for idempotent attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachToken(u64);

impl AttachToken {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_ATTACH_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

enum Slot {
    Value(Value),
    Computed(Rc<ComputedProperty>),
}

struct OwnerInner {
    id: u64,
    class_name: String,
    slots: RefCell<AHashMap<String, Slot>>,
    observers: RefCell<AHashMap<String, Rc<ObserverList<KeyObserver>>>>,
    /// Dependent key -> computed keys deriving from it.
    dependents: RefCell<AHashMap<String, Vec<String>>>,
    retained: RefCell<Vec<Box<dyn Any>>>,
    attached: RefCell<AHashSet<AttachToken>>,
}

/// Handle to an owner instance.
#[derive(Clone)]
pub struct Owner {
    inner: Rc<OwnerInner>,
}

/// Non-owning handle, used by callbacks the instance itself keeps alive.
#[derive(Clone)]
pub struct WeakOwner {
    inner: Weak<OwnerInner>,
}

impl WeakOwner {
    #[must_use]
    pub fn upgrade(&self) -> Option<Owner> {
        self.inner.upgrade().map(|inner| Owner { inner })
    }
}

impl fmt::Debug for WeakOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakOwner")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl PartialEq for Owner {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Owner {}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = match self.inner.slots.try_borrow() {
            Ok(slots) => slots.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        f.debug_struct("Owner")
            .field("id", &self.inner.id)
            .field("class", &self.inner.class_name)
            .field("keys", &keys)
            .finish()
    }
}

impl Owner {
    /// Create a bare instance with no slots.
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(OwnerInner {
                id: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
                class_name: class_name.into(),
                slots: RefCell::new(AHashMap::new()),
                observers: RefCell::new(AHashMap::new()),
                dependents: RefCell::new(AHashMap::new()),
                retained: RefCell::new(Vec::new()),
                attached: RefCell::new(AHashSet::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakOwner {
        WeakOwner {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Read `key`, running its getter if it is computed.
    ///
    /// Unknown keys read as [`Value::Absent`].
    pub fn get(&self, key: &str) -> Result<Value> {
        let computed = match self.inner.slots.borrow().get(key) {
            None => return Ok(Value::Absent),
            Some(Slot::Value(value)) => return Ok(value.clone()),
            Some(Slot::Computed(computed)) => Rc::clone(computed),
        };
        computed.get(self)
    }

    /// Assign `key` and notify its observers.
    ///
    /// Plain slots store `value` and return it; assigning a value strictly
    /// equal to the current one notifies nobody. Computed slots hand
    /// `value` to the setter and return whatever the setter produced.
    pub fn set(&self, key: &str, value: Value) -> Result<Value> {
        let computed = match self.inner.slots.borrow().get(key) {
            Some(Slot::Computed(computed)) => Some(Rc::clone(computed)),
            _ => None,
        };

        let stored = match computed {
            Some(computed) => {
                let setter = computed.setter().ok_or_else(|| WeftError::ReadOnly {
                    key: key.to_string(),
                })?;
                setter(self, value)?
            }
            None => {
                let previous = self
                    .inner
                    .slots
                    .borrow_mut()
                    .insert(key.to_string(), Slot::Value(value.clone()));
                if let Some(Slot::Value(previous)) = previous
                    && previous == value
                {
                    return Ok(value);
                }
                value
            }
        };

        self.notify(key)?;
        Ok(stored)
    }

    /// Store `value` without notifying anyone. Used while an instance is
    /// still being built.
    pub(crate) fn set_silently(&self, key: &str, value: Value) {
        self.inner
            .slots
            .borrow_mut()
            .insert(key.to_string(), Slot::Value(value));
    }

    /// Install `property` at `key` on this instance only.
    ///
    /// Any plain value previously stored at `key` is discarded.
    pub fn define_computed(&self, key: &str, property: ComputedProperty) {
        {
            let mut dependents = self.inner.dependents.borrow_mut();
            for dep in property.dependent_keys() {
                let entry = dependents.entry(dep.clone()).or_default();
                if !entry.iter().any(|k| k == key) {
                    entry.push(key.to_string());
                }
            }
        }
        self.inner
            .slots
            .borrow_mut()
            .insert(key.to_string(), Slot::Computed(Rc::new(property)));
        tracing::trace!(message = "weft.owner.define_computed", owner = self.inner.id, key);
    }

    #[must_use]
    pub fn is_computed(&self, key: &str) -> bool {
        matches!(self.inner.slots.borrow().get(key), Some(Slot::Computed(_)))
    }

    /// Observe reference-level reassignment of `key`.
    pub fn add_observer<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(&Owner, &str) -> Result<()> + 'static,
    {
        let list = Rc::clone(
            self.inner
                .observers
                .borrow_mut()
                .entry(key.to_string())
                .or_insert_with(|| Rc::new(ObserverList::new())),
        );
        list.register(Rc::new(callback))
    }

    /// Number of live observers on `key`.
    #[must_use]
    pub fn observer_count(&self, key: &str) -> usize {
        self.inner
            .observers
            .borrow()
            .get(key)
            .map_or(0, |list| list.live_count())
    }

    /// Run the observers of `key`, then those of computed keys deriving
    /// from it.
    pub fn notify(&self, key: &str) -> Result<()> {
        self.notify_one(key)?;
        let dependents = self
            .inner
            .dependents
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_default();
        for dependent in &dependents {
            self.notify_one(dependent)?;
        }
        Ok(())
    }

    fn notify_one(&self, key: &str) -> Result<()> {
        let list = self.inner.observers.borrow().get(key).cloned();
        if let Some(list) = list {
            for observer in list.live() {
                observer(self, key)?;
            }
        }
        Ok(())
    }

    /// Keep `item` alive for as long as this instance, or until
    /// [`teardown`](Self::teardown).
    pub fn retain<T: Any>(&self, item: T) {
        self.inner.retained.borrow_mut().push(Box::new(item));
    }

    #[must_use]
    pub fn is_attached(&self, token: AttachToken) -> bool {
        self.inner.attached.borrow().contains(&token)
    }

    /// Record that `token` has been attached to this instance.
    ///
    /// Returns `false` if it already was, so callers can skip re-attaching.
    pub fn mark_attached(&self, token: AttachToken) -> bool {
        self.inner.attached.borrow_mut().insert(token)
    }

    /// Drop every retained registration, deregistering its observers.
    ///
    /// Slot values are kept; attachments may be made again afterwards.
    pub fn teardown(&self) {
        let retained = std::mem::take(&mut *self.inner.retained.borrow_mut());
        self.inner.attached.borrow_mut().clear();
        tracing::debug!(
            message = "weft.owner.teardown",
            owner = self.inner.id,
            released = retained.len()
        );
        drop(retained);
    }
}
