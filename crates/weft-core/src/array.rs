#![forbid(unsafe_code)]

//! Identity-bearing observable arrays.
//!
//! [`ObservableArray`] is a shared, mutable sequence of [`Value`]s. Cloning
//! the handle never copies the contents: every clone refers to the same
//! array, and equality between handles is identity.
//!
//! # Mutation protocol
//!
//! Every mutation funnels through [`ObservableArray::splice`], which runs in
//! three phases:
//!
//! 1. `will_change(start, removed)` on every observer, while the array still
//!    holds its pre-mutation contents.
//! 2. The contents are updated and the version is bumped.
//! 3. `did_change(start, removed, added)` on every observer, against the
//!    post-mutation contents.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the contents.
//! 2. Observers are notified in registration order.
//! 3. All `will_change` calls of a mutation happen before all `did_change`
//!    calls of the same mutation.
//! 4. A splice that neither removes nor inserts is a no-op.
//!
//! # Failure Modes
//!
//! - **Observer error in `will_change`**: the mutation is aborted and the
//!   contents stay untouched.
//! - **Observer error in `did_change`**: the contents are already updated;
//!   the remaining observers are skipped and the error is returned.
//! - **Re-entrant mutation**: mutating an array from inside one of its own
//!   callbacks fails with [`WeftError::ReentrantMutation`].
//! - **Self-containing array**: an array holding itself, directly or through
//!   nested arrays, is a reference cycle and is never freed until the
//!   element is removed. Joining and `Debug` stop at the back-reference,
//!   which joins as the empty string and debug-prints as `<cycle>`.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, WeftError};
use crate::subscription::{ObserverList, Subscription};
use crate::value::Value;

static NEXT_ARRAY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Arrays currently being rendered on this thread, outermost first.
    static RENDERING: RefCell<Vec<ArrayId>> = const { RefCell::new(Vec::new()) };
}

/// Pops the rendering stack even if rendering panics.
struct RenderExit;

impl Drop for RenderExit {
    fn drop(&mut self) {
        RENDERING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn next_array_id() -> ArrayId {
    ArrayId(NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed))
}

/// Process-unique identity of an [`ObservableArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayId(u64);

impl ArrayId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArrayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Low-level mutation hooks registered on one array.
///
/// Both phases default to doing nothing, so implementors only override the
/// phase they care about.
pub trait ArrayObserver {
    /// Called before `removed` elements starting at `start` are replaced.
    fn will_change(&self, _array: &ObservableArray, _start: usize, _removed: usize) -> Result<()> {
        Ok(())
    }

    /// Called after the mutation with the number of inserted elements.
    fn did_change(
        &self,
        _array: &ObservableArray,
        _start: usize,
        _removed: usize,
        _added: usize,
    ) -> Result<()> {
        Ok(())
    }
}

/// Content-level observer: "something changed", without slice detail.
struct ContentObserver<F>(F);

impl<F> ArrayObserver for ContentObserver<F>
where
    F: Fn(&ObservableArray) -> Result<()>,
{
    fn did_change(
        &self,
        array: &ObservableArray,
        _start: usize,
        _removed: usize,
        _added: usize,
    ) -> Result<()> {
        (self.0)(array)
    }
}

struct ArrayInner {
    id: ArrayId,
    items: RefCell<Vec<Value>>,
    observers: ObserverList<dyn ArrayObserver>,
    dispatching: Cell<bool>,
    version: Cell<u64>,
}

/// Clears the dispatch flag even if an observer panics.
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A shared, observable array of [`Value`]s.
#[derive(Clone)]
pub struct ObservableArray {
    inner: Rc<ArrayInner>,
}

impl PartialEq for ObservableArray {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ObservableArray {}

impl fmt::Debug for ObservableArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ObservableArray");
        dbg.field("id", &self.inner.id);
        let rendered = self.render_once(|| match self.inner.items.try_borrow() {
            Ok(items) => {
                dbg.field("items", &*items);
            }
            Err(_) => {
                dbg.field("items", &"<borrowed>");
            }
        });
        if rendered.is_none() {
            dbg.field("items", &"<cycle>");
        }
        dbg.field("version", &self.inner.version.get()).finish()
    }
}

impl Default for ObservableArray {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for ObservableArray {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::with_items(iter.into_iter().collect())
    }
}

impl ObservableArray {
    /// Create an empty array.
    #[must_use]
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Create an array that takes ownership of `items`.
    #[must_use]
    pub fn with_items(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                id: next_array_id(),
                items: RefCell::new(items),
                observers: ObserverList::new(),
                dispatching: Cell::new(false),
                version: Cell::new(0),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> ArrayId {
        self.inner.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mutations applied since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Copy of `[start, end)`, clamped to the current length.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Vec<Value> {
        let items = self.inner.items.borrow();
        let end = end.min(items.len());
        let start = start.min(end);
        items[start..end].to_vec()
    }

    /// Borrow the contents for the duration of `f`.
    ///
    /// # Panics
    ///
    /// Panics if `f` mutates this same array.
    pub fn with<R>(&self, f: impl FnOnce(&[Value]) -> R) -> R {
        let items: Ref<'_, Vec<Value>> = self.inner.items.borrow();
        f(&items)
    }

    /// Elements rendered with [`Value::join_fragment`] and joined by `separator`.
    ///
    /// A nested reference back to an array already being joined renders as
    /// the empty string.
    #[must_use]
    pub fn join(&self, separator: &str) -> String {
        self.render_once(|| {
            self.with(|items| {
                items
                    .iter()
                    .map(Value::join_fragment)
                    .collect::<Vec<_>>()
                    .join(separator)
            })
        })
        .unwrap_or_default()
    }

    /// Run `f` unless this array is already being rendered further up the
    /// stack.
    fn render_once<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let id = self.inner.id;
        let entered = RENDERING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&id) {
                false
            } else {
                stack.push(id);
                true
            }
        });
        if !entered {
            return None;
        }
        let _exit = RenderExit;
        Some(f())
    }

    /// Whether any element is strictly equal to `value`.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.with(|items| items.contains(value))
    }

    /// Register mutation hooks on this array.
    pub fn observe<O: ArrayObserver + 'static>(&self, observer: O) -> Subscription {
        self.observe_rc(Rc::new(observer))
    }

    /// Register an already shared observer.
    pub fn observe_rc(&self, observer: Rc<dyn ArrayObserver>) -> Subscription {
        self.inner.observers.register(observer)
    }

    /// Register a content-level callback, run after every mutation.
    pub fn on_change<F>(&self, f: F) -> Subscription
    where
        F: Fn(&ObservableArray) -> Result<()> + 'static,
    {
        self.observe(ContentObserver(f))
    }

    /// Number of live observers (mutation hooks and content callbacks).
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.live_count()
    }

    /// Replace `remove` elements starting at `start` with `items`.
    ///
    /// `start` is clamped to the length and `remove` to what remains after
    /// `start`. Returns the removed elements.
    pub fn splice(&self, start: usize, remove: usize, items: Vec<Value>) -> Result<Vec<Value>> {
        if self.inner.dispatching.get() {
            tracing::warn!(message = "weft.array.reentrant", array = self.inner.id.raw());
            return Err(WeftError::ReentrantMutation {
                array: self.inner.id,
            });
        }

        let len = self.len();
        let start = start.min(len);
        let remove = remove.min(len - start);
        let added = items.len();
        if remove == 0 && added == 0 {
            return Ok(Vec::new());
        }

        self.inner.dispatching.set(true);
        let _guard = DispatchGuard(&self.inner.dispatching);

        let observers = self.inner.observers.live();
        for observer in &observers {
            observer.will_change(self, start, remove)?;
        }

        let removed: Vec<Value> = self
            .inner
            .items
            .borrow_mut()
            .splice(start..start + remove, items)
            .collect();
        self.inner.version.set(self.inner.version.get() + 1);

        tracing::trace!(
            message = "weft.array.splice",
            array = self.inner.id.raw(),
            start,
            removed = remove,
            added
        );

        for observer in &observers {
            observer.did_change(self, start, remove, added)?;
        }
        Ok(removed)
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let len = self.len();
        self.splice(len, 0, vec![value.into()]).map(drop)
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.splice(index, 0, vec![value.into()]).map(drop)
    }

    /// Remove and return the element at `index`, if there is one.
    pub fn remove_at(&self, index: usize) -> Result<Option<Value>> {
        Ok(self.splice(index, 1, Vec::new())?.into_iter().next())
    }

    pub fn pop(&self) -> Result<Option<Value>> {
        match self.len() {
            0 => Ok(None),
            len => self.remove_at(len - 1),
        }
    }

    pub fn clear(&self) -> Result<()> {
        let len = self.len();
        self.splice(0, len, Vec::new()).map(drop)
    }

    /// Swap the whole contents in one mutation, keeping this array's identity.
    pub fn replace_contents(&self, items: Vec<Value>) -> Result<()> {
        let len = self.len();
        self.splice(0, len, items).map(drop)
    }
}
