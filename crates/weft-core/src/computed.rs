#![forbid(unsafe_code)]

//! Computed property definitions installed on individual owners.
//!
//! A [`ComputedProperty`] is a getter plus an optional setter, both handed
//! the owning instance. Getters run on every read; nothing is memoized, so a
//! getter always observes the current state of whatever it reads.
//!
//! The setter's return value, not its argument, becomes the result of
//! [`Owner::set`](crate::owner::Owner::set). Setters use this to report the
//! value they actually stored after normalizing the input.

use std::fmt;

use crate::error::Result;
use crate::owner::Owner;
use crate::value::Value;

pub type Getter = Box<dyn Fn(&Owner) -> Result<Value>>;
pub type Setter = Box<dyn Fn(&Owner, Value) -> Result<Value>>;

/// Accessor pair for one key on one owner.
pub struct ComputedProperty {
    getter: Getter,
    setter: Option<Setter>,
    dependent_keys: Vec<String>,
}

impl fmt::Debug for ComputedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedProperty")
            .field("settable", &self.setter.is_some())
            .field("dependent_keys", &self.dependent_keys)
            .finish()
    }
}

impl ComputedProperty {
    /// Create a read-only computed property.
    pub fn new(getter: impl Fn(&Owner) -> Result<Value> + 'static) -> Self {
        Self {
            getter: Box::new(getter),
            setter: None,
            dependent_keys: Vec::new(),
        }
    }

    /// Make the property writable.
    #[must_use]
    pub fn with_setter(mut self, setter: impl Fn(&Owner, Value) -> Result<Value> + 'static) -> Self {
        self.setter = Some(Box::new(setter));
        self
    }

    /// Declare that this property derives from `key`.
    ///
    /// Reassigning `key` on the owner also notifies observers of this
    /// property.
    #[must_use]
    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.dependent_keys.push(key.into());
        self
    }

    #[must_use]
    pub fn is_settable(&self) -> bool {
        self.setter.is_some()
    }

    #[must_use]
    pub fn dependent_keys(&self) -> &[String] {
        &self.dependent_keys
    }

    pub(crate) fn get(&self, owner: &Owner) -> Result<Value> {
        (self.getter)(owner)
    }

    pub(crate) fn setter(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }
}
