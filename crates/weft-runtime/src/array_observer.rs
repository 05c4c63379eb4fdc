#![forbid(unsafe_code)]

//! Added/removed notifications for an array-valued owner key.
//!
//! An [`ArrayChangeObserver`] watches one dependent key on each owner it is
//! attached to and reports element-level changes through
//! [`ArrayCallbacks`]:
//!
//! - on attach, `added(item, index)` for every element already present;
//! - on in-place mutation, `removed` for the slice about to go (read from
//!   the pre-mutation array) and then `added` for the inserted slice (read
//!   from the post-mutation array);
//! - on reassignment of the key to a different array, the old array's
//!   hook is deregistered, `removed` is reported for its elements (unless
//!   the policy is [`ReplacementPolicy::Minimal`]), and the new array is
//!   treated exactly like the initial attach.
//!
//! # Invariants
//!
//! 1. An owner watches at most one array per attached observer; the old
//!    array's hook is always deregistered before the new one is registered.
//! 2. Within one mutation, every `removed` fires before any `added`.
//! 3. Notifications are synchronous and in mutation order.
//! 4. Attaching the same observer to the same owner twice is a no-op.
//! 5. Reassigning the key to the array it already holds is a no-op.
//! 6. The new array is watched even when a callback reporting the swap
//!    fails; the error is returned after the watch has moved.
//!
//! # Failure Modes
//!
//! - **Key not holding an array at attach**: [`WeftError::NotArray`].
//! - **Key cleared to a non-array later**: the old array is released and,
//!   under [`ReplacementPolicy::ContentAware`], its elements are reported as
//!   removed. Nothing is watched until an array is assigned again.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use weft_core::array::{ArrayObserver, ObservableArray};
use weft_core::class::{Class, Mixin};
use weft_core::error::{Result, WeftError};
use weft_core::owner::{AttachToken, Owner, WeakOwner};
use weft_core::subscription::Subscription;
use weft_core::value::Value;

/// Receiver of element-level changes for one owner.
pub trait ArrayCallbacks {
    fn added(&self, owner: &Owner, item: &Value, index: usize) -> Result<()>;
    fn removed(&self, owner: &Owner, item: &Value, index: usize) -> Result<()>;

    /// Called once `array` is no longer watched, after any removals were
    /// reported for it. Runs under every [`ReplacementPolicy`].
    fn released(&self, _owner: &Owner, _array: &ObservableArray) -> Result<()> {
        Ok(())
    }
}

type ItemFn = dyn Fn(&Owner, &Value, usize) -> Result<()>;

/// [`ArrayCallbacks`] built from two closures. Unset callbacks do nothing.
#[derive(Clone)]
pub struct CallbackFns {
    added: Rc<ItemFn>,
    removed: Rc<ItemFn>,
}

fn ignore(_: &Owner, _: &Value, _: usize) -> Result<()> {
    Ok(())
}

impl Default for CallbackFns {
    fn default() -> Self {
        Self {
            added: Rc::new(ignore),
            removed: Rc::new(ignore),
        }
    }
}

impl CallbackFns {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_added(mut self, f: impl Fn(&Owner, &Value, usize) -> Result<()> + 'static) -> Self {
        self.added = Rc::new(f);
        self
    }

    #[must_use]
    pub fn on_removed(
        mut self,
        f: impl Fn(&Owner, &Value, usize) -> Result<()> + 'static,
    ) -> Self {
        self.removed = Rc::new(f);
        self
    }
}

impl ArrayCallbacks for CallbackFns {
    fn added(&self, owner: &Owner, item: &Value, index: usize) -> Result<()> {
        (self.added)(owner, item, index)
    }

    fn removed(&self, owner: &Owner, item: &Value, index: usize) -> Result<()> {
        (self.removed)(owner, item, index)
    }
}

/// What happens to the old array's elements when the key is reassigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplacementPolicy {
    /// Report every element of the replaced array as removed.
    #[default]
    ContentAware,
    /// Report nothing for the replaced array.
    Minimal,
}

type CallbackFactory = Rc<dyn Fn(&Owner) -> Rc<dyn ArrayCallbacks>>;

/// Declarative added/removed observation of one array-valued key.
///
/// Attach it to owners directly with [`attach`](Self::attach) or install it
/// on a [`Class`] as a [`Mixin`], which attaches on every new instance.
#[derive(Clone)]
pub struct ArrayChangeObserver {
    key: String,
    policy: ReplacementPolicy,
    factory: CallbackFactory,
    token: AttachToken,
}

impl fmt::Debug for ArrayChangeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayChangeObserver")
            .field("key", &self.key)
            .field("policy", &self.policy)
            .field("token", &self.token)
            .finish()
    }
}

impl ArrayChangeObserver {
    /// Observe `key` with callbacks shared by every owner.
    pub fn new(key: impl Into<String>, callbacks: impl ArrayCallbacks + 'static) -> Self {
        let shared: Rc<dyn ArrayCallbacks> = Rc::new(callbacks);
        Self::from_factory(key.into(), Rc::new(move |_: &Owner| Rc::clone(&shared)))
    }

    /// Observe `key` with callbacks built once per owner.
    ///
    /// Use this when the callbacks carry state that must not be shared
    /// between instances.
    pub fn with_factory<C, F>(key: impl Into<String>, factory: F) -> Self
    where
        C: ArrayCallbacks + 'static,
        F: Fn(&Owner) -> C + 'static,
    {
        Self::from_factory(
            key.into(),
            Rc::new(move |owner: &Owner| Rc::new(factory(owner)) as Rc<dyn ArrayCallbacks>),
        )
    }

    fn from_factory(key: String, factory: CallbackFactory) -> Self {
        Self {
            key,
            policy: ReplacementPolicy::default(),
            factory,
            token: AttachToken::next(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReplacementPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    /// Start observing on `owner`.
    ///
    /// Reports every current element as added, then watches for mutation
    /// and reassignment. Does nothing if already attached to `owner`.
    pub fn attach(&self, owner: &Owner) -> Result<()> {
        if owner.is_attached(self.token) {
            tracing::trace!(message = "weft.observer.reattach", owner = owner.id(), key = %self.key);
            return Ok(());
        }

        let current = owner.get(&self.key)?;
        let array = current.as_array().cloned().ok_or_else(|| WeftError::NotArray {
            key: self.key.clone(),
            found: current.describe(),
        })?;

        let registration = Rc::new(Registration {
            owner: owner.downgrade(),
            key: self.key.clone(),
            policy: self.policy,
            callbacks: (self.factory)(owner),
            watched: RefCell::new(None),
        });
        registration.swap(owner, Some(array))?;

        let weak = Rc::downgrade(&registration);
        let key_subscription = owner.add_observer(&self.key, move |owner, _| match weak.upgrade() {
            Some(registration) => registration.reassigned(owner),
            None => Ok(()),
        });

        owner.mark_attached(self.token);
        owner.retain(ActiveRegistration {
            _registration: registration,
            _key_subscription: key_subscription,
        });
        tracing::debug!(
            message = "weft.observer.attach",
            owner = owner.id(),
            key = %self.key,
            policy = ?self.policy
        );
        Ok(())
    }
}

impl Mixin for ArrayChangeObserver {
    fn install(self, class: &mut Class) {
        class.add_init_hook(Rc::new(move |owner: &Owner| self.attach(owner)));
    }
}

/// Kept alive by the owner; dropping it ends the observation.
struct ActiveRegistration {
    _registration: Rc<Registration>,
    _key_subscription: Subscription,
}

struct Watched {
    array: ObservableArray,
    hook: Subscription,
}

/// One owner's subscription to whichever array its key currently holds.
struct Registration {
    owner: WeakOwner,
    key: String,
    policy: ReplacementPolicy,
    callbacks: Rc<dyn ArrayCallbacks>,
    watched: RefCell<Option<Watched>>,
}

impl Registration {
    fn reassigned(self: &Rc<Self>, owner: &Owner) -> Result<()> {
        match owner.get(&self.key)? {
            Value::Array(array) => self.swap(owner, Some(array)),
            other => {
                tracing::debug!(
                    message = "weft.observer.cleared",
                    owner = owner.id(),
                    key = %self.key,
                    found = %other.describe()
                );
                self.swap(owner, None)
            }
        }
    }

    /// Move the watch from the current array to `next`.
    ///
    /// The watch itself is moved before any callback runs, so a failing
    /// callback is reported without leaving the key unobserved.
    fn swap(self: &Rc<Self>, owner: &Owner, next: Option<ObservableArray>) -> Result<()> {
        let unchanged = match (&*self.watched.borrow(), &next) {
            (Some(watched), Some(next)) => watched.array == *next,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        let previous = self.watched.borrow_mut().take().map(|Watched { array, hook }| {
            hook.unsubscribe();
            array
        });
        if let Some(array) = &next {
            let hook = array.observe(MutationHook {
                registration: Rc::downgrade(self),
            });
            *self.watched.borrow_mut() = Some(Watched {
                array: array.clone(),
                hook,
            });
        }

        if let Some(old) = previous {
            tracing::debug!(
                message = "weft.observer.swap",
                owner = owner.id(),
                key = %self.key,
                from = old.id().raw(),
                to = next.as_ref().map(|a| a.id().raw())
            );
            let reported = match self.policy {
                ReplacementPolicy::ContentAware => self.report_removed(owner, &old),
                ReplacementPolicy::Minimal => Ok(()),
            };
            self.callbacks.released(owner, &old)?;
            reported?;
        }

        if let Some(array) = next {
            for (index, item) in array.snapshot().iter().enumerate() {
                self.callbacks.added(owner, item, index)?;
            }
        }
        Ok(())
    }

    fn report_removed(&self, owner: &Owner, array: &ObservableArray) -> Result<()> {
        for (index, item) in array.snapshot().iter().enumerate() {
            self.callbacks.removed(owner, item, index)?;
        }
        Ok(())
    }
}

/// Mutation hook translating splices into added/removed callbacks.
struct MutationHook {
    registration: Weak<Registration>,
}

impl MutationHook {
    fn target(&self) -> Option<(Rc<Registration>, Owner)> {
        let registration = self.registration.upgrade()?;
        let owner = registration.owner.upgrade()?;
        Some((registration, owner))
    }
}

impl ArrayObserver for MutationHook {
    fn will_change(&self, array: &ObservableArray, start: usize, removed: usize) -> Result<()> {
        let Some((registration, owner)) = self.target() else {
            return Ok(());
        };
        for (offset, item) in array.slice(start, start + removed).iter().enumerate() {
            registration.callbacks.removed(&owner, item, start + offset)?;
        }
        Ok(())
    }

    fn did_change(
        &self,
        array: &ObservableArray,
        start: usize,
        _removed: usize,
        added: usize,
    ) -> Result<()> {
        let Some((registration, owner)) = self.target() else {
            return Ok(());
        };
        for (offset, item) in array.slice(start, start + added).iter().enumerate() {
            registration.callbacks.added(&owner, item, start + offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Rc<RefCell<Vec<String>>>;

    fn recording(log: &Log) -> CallbackFns {
        let added = Rc::clone(log);
        let removed = Rc::clone(log);
        CallbackFns::new()
            .on_added(move |_, item, index| {
                added.borrow_mut().push(format!("+{item}@{index}"));
                Ok(())
            })
            .on_removed(move |_, item, index| {
                removed.borrow_mut().push(format!("-{item}@{index}"));
                Ok(())
            })
    }

    fn owner_with(items: &[&str]) -> (Owner, ObservableArray) {
        let owner = Owner::new("Test");
        let array = ObservableArray::from_iter(items.iter().map(|s| Value::from(*s)));
        owner.set("items", Value::Array(array.clone())).unwrap();
        (owner, array)
    }

    #[test]
    fn attach_reports_existing_elements_in_order() {
        let log = Log::default();
        let (owner, _) = owner_with(&["a", "b", "c"]);
        ArrayChangeObserver::new("items", recording(&log))
            .attach(&owner)
            .unwrap();
        assert_eq!(*log.borrow(), vec!["+a@0", "+b@1", "+c@2"]);
    }

    #[test]
    fn removals_precede_additions_within_a_mutation() {
        let log = Log::default();
        let (owner, array) = owner_with(&["a", "b", "c", "d", "e"]);
        ArrayChangeObserver::new("items", recording(&log))
            .attach(&owner)
            .unwrap();
        log.borrow_mut().clear();

        array.splice(2, 2, vec!["x".into()]).unwrap();
        assert_eq!(*log.borrow(), vec!["-c@2", "-d@3", "+x@2"]);
    }

    #[test]
    fn attach_is_idempotent() {
        let log = Log::default();
        let (owner, array) = owner_with(&["a"]);
        let observer = ArrayChangeObserver::new("items", recording(&log));
        observer.attach(&owner).unwrap();
        observer.attach(&owner).unwrap();

        assert_eq!(*log.borrow(), vec!["+a@0"]);
        assert_eq!(array.observer_count(), 1);
    }

    #[test]
    fn non_array_at_attach_is_rejected() {
        let owner = Owner::new("Test");
        owner.set("items", "nope".into()).unwrap();
        let err = ArrayChangeObserver::new("items", CallbackFns::new())
            .attach(&owner)
            .unwrap_err();
        assert_eq!(
            err,
            WeftError::NotArray {
                key: "items".to_string(),
                found: "string \"nope\"".to_string(),
            }
        );
    }

    #[test]
    fn replacement_swaps_hook_and_reports_both_sides() {
        let log = Log::default();
        let (owner, old) = owner_with(&["a", "b"]);
        ArrayChangeObserver::new("items", recording(&log))
            .attach(&owner)
            .unwrap();
        log.borrow_mut().clear();

        let new = ObservableArray::from_iter(["x", "y"].map(Value::from));
        owner.set("items", Value::Array(new.clone())).unwrap();

        assert_eq!(*log.borrow(), vec!["-a@0", "-b@1", "+x@0", "+y@1"]);
        assert_eq!(old.observer_count(), 0);
        assert_eq!(new.observer_count(), 1);

        // The old array is no longer watched.
        log.borrow_mut().clear();
        old.push("zzz").unwrap();
        assert!(log.borrow().is_empty());
        new.push("z").unwrap();
        assert_eq!(*log.borrow(), vec!["+z@2"]);
    }

    #[test]
    fn minimal_policy_skips_removals_on_replacement() {
        let log = Log::default();
        let (owner, _) = owner_with(&["a"]);
        ArrayChangeObserver::new("items", recording(&log))
            .with_policy(ReplacementPolicy::Minimal)
            .attach(&owner)
            .unwrap();
        log.borrow_mut().clear();

        owner.set("items", Value::array(["b"])).unwrap();
        assert_eq!(*log.borrow(), vec!["+b@0"]);

        owner.set("items", Value::Absent).unwrap();
        assert_eq!(*log.borrow(), vec!["+b@0"]);
    }

    #[test]
    fn clearing_to_non_array_releases_old_array() {
        let log = Log::default();
        let (owner, old) = owner_with(&["a"]);
        ArrayChangeObserver::new("items", recording(&log))
            .attach(&owner)
            .unwrap();
        log.borrow_mut().clear();

        owner.set("items", Value::Absent).unwrap();
        assert_eq!(*log.borrow(), vec!["-a@0"]);
        assert_eq!(old.observer_count(), 0);

        // Re-assigning an array resumes observation.
        owner.set("items", Value::array(["q"])).unwrap();
        assert_eq!(*log.borrow(), vec!["-a@0", "+q@0"]);
    }

    #[test]
    fn reassigning_same_array_is_noop() {
        let log = Log::default();
        let (owner, array) = owner_with(&["a"]);
        ArrayChangeObserver::new("items", recording(&log))
            .attach(&owner)
            .unwrap();
        owner.set("items", Value::Array(array.clone())).unwrap();
        assert_eq!(*log.borrow(), vec!["+a@0"]);
        assert_eq!(array.observer_count(), 1);
    }

    #[test]
    fn per_owner_factory_state_is_not_shared() {
        struct Counter {
            count: RefCell<usize>,
            sink: Log,
        }
        impl ArrayCallbacks for Counter {
            fn added(&self, owner: &Owner, _: &Value, _: usize) -> Result<()> {
                *self.count.borrow_mut() += 1;
                let line = format!("{}:{}", owner.get("name")?, self.count.borrow());
                self.sink.borrow_mut().push(line);
                Ok(())
            }
            fn removed(&self, _: &Owner, _: &Value, _: usize) -> Result<()> {
                Ok(())
            }
        }

        let log = Log::default();
        let sink = Rc::clone(&log);
        let class = Class::new("Counted")
            .with_default("items", || Value::array(["a", "b"]))
            .with(ArrayChangeObserver::with_factory("items", move |_| Counter {
                count: RefCell::new(0),
                sink: Rc::clone(&sink),
            }));

        class.create_with([("name", Value::from("one"))]).unwrap();
        class.create_with([("name", Value::from("two"))]).unwrap();
        assert_eq!(*log.borrow(), vec!["one:1", "one:2", "two:1", "two:2"]);
    }

    #[test]
    fn teardown_stops_notifications() {
        let log = Log::default();
        let (owner, array) = owner_with(&[]);
        ArrayChangeObserver::new("items", recording(&log))
            .attach(&owner)
            .unwrap();
        owner.teardown();

        assert_eq!(array.observer_count(), 0);
        assert_eq!(owner.observer_count("items"), 0);
        array.push("a").unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn failing_added_on_replacement_still_moves_the_watch() {
        let log = Log::default();
        let (owner, old) = owner_with(&[]);
        let sink = Rc::clone(&log);
        ArrayChangeObserver::new(
            "items",
            CallbackFns::new().on_added(move |_, item, index| match item {
                Value::Int(_) => {
                    sink.borrow_mut().push(format!("+{item}@{index}"));
                    Ok(())
                }
                other => Err(WeftError::NotArray {
                    key: "items".to_string(),
                    found: other.describe(),
                }),
            }),
        )
        .attach(&owner)
        .unwrap();

        let replacement = ObservableArray::from_iter(["flat"].map(Value::from));
        assert!(owner.set("items", Value::Array(replacement.clone())).is_err());
        assert_eq!(old.observer_count(), 0);
        assert_eq!(replacement.observer_count(), 1);

        replacement.clear().unwrap();
        replacement.push(7i64).unwrap();
        assert_eq!(*log.borrow(), vec!["+7@0"]);
    }

    #[test]
    fn released_runs_under_every_policy() {
        struct Releases(Log);
        impl ArrayCallbacks for Releases {
            fn added(&self, _: &Owner, _: &Value, _: usize) -> Result<()> {
                Ok(())
            }
            fn removed(&self, _: &Owner, item: &Value, _: usize) -> Result<()> {
                self.0.borrow_mut().push(format!("-{item}"));
                Ok(())
            }
            fn released(&self, _: &Owner, array: &ObservableArray) -> Result<()> {
                self.0.borrow_mut().push(format!("released [{}]", array.join(",")));
                Ok(())
            }
        }

        for (policy, expected) in [
            (ReplacementPolicy::ContentAware, vec!["-a", "released [a]"]),
            (ReplacementPolicy::Minimal, vec!["released [a]"]),
        ] {
            let log = Log::default();
            let (owner, _) = owner_with(&["a"]);
            ArrayChangeObserver::new("items", Releases(Rc::clone(&log)))
                .with_policy(policy)
                .attach(&owner)
                .unwrap();
            owner.set("items", Value::Absent).unwrap();
            assert_eq!(*log.borrow(), expected, "policy {policy:?}");
        }
    }

    #[test]
    fn callback_error_propagates_from_mutation() {
        let (owner, array) = owner_with(&[]);
        ArrayChangeObserver::new(
            "items",
            CallbackFns::new().on_added(|_, item, _| match item {
                Value::Int(_) => Ok(()),
                other => Err(WeftError::NotArray {
                    key: "items".to_string(),
                    found: other.describe(),
                }),
            }),
        )
        .attach(&owner)
        .unwrap();

        array.push(1i64).unwrap();
        assert!(array.push("bad").is_err());
    }
}
