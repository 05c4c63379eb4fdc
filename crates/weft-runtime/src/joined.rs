#![forbid(unsafe_code)]

//! A string view over an array, writable in both directions.
//!
//! [`JoinedArray`] defines a computed property that reads as the dependent
//! array joined by a separator. Writing a string splits it and merges the
//! pieces into the existing array in place, so the array keeps its identity
//! and anything observing it sees ordinary added/removed notifications.
//!
//! # Semantics
//!
//! - **Get**: absent when the dependent key is absent, otherwise the joined
//!   contents.
//! - **Set `""`**: the array is merged down to nothing.
//! - **Set a string**: the array is merged to the split pieces.
//! - **Set absent**: the array is merged back to the default captured on
//!   first access, so clearing the view restores prior content instead of
//!   losing it.
//! - The setter returns the joined *post-merge* array, which differs from
//!   the input whenever the comparator treats distinct pieces as equal.
//!
//! The captured default is per instance: the property is installed through
//! [`ScopedProperty`], which builds fresh state for every owner.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use weft_core::class::{Class, Mixin};
use weft_core::computed::ComputedProperty;
use weft_core::error::{Result, WeftError};
use weft_core::owner::Owner;
use weft_core::value::Value;

use crate::merge::{Comparator, identity, merge};
use crate::scoped::ScopedProperty;

pub const DEFAULT_SEPARATOR: &str = ",";

/// Builder for a joined-string view of an array-valued key.
#[derive(Clone)]
pub struct JoinedArray {
    key: String,
    dependent_key: String,
    separator: String,
    comparator: Rc<Comparator>,
}

impl fmt::Debug for JoinedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinedArray")
            .field("key", &self.key)
            .field("dependent_key", &self.dependent_key)
            .field("separator", &self.separator)
            .finish_non_exhaustive()
    }
}

impl JoinedArray {
    /// View `dependent_key` as a string under `key`.
    pub fn new(key: impl Into<String>, dependent_key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            dependent_key: dependent_key.into(),
            separator: DEFAULT_SEPARATOR.to_string(),
            comparator: Rc::new(identity),
        }
    }

    /// Separator used both to join and to split. Empty splits into characters.
    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Comparator the setter merges with instead of strict equality.
    #[must_use]
    pub fn merge_with(mut self, comparator: impl Fn(&Value, &Value) -> bool + 'static) -> Self {
        self.comparator = Rc::new(comparator);
        self
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fresh computed property with its own captured default.
    #[must_use]
    pub fn computed(&self) -> ComputedProperty {
        let state = Rc::new(JoinedState {
            key: self.key.clone(),
            dependent_key: self.dependent_key.clone(),
            separator: self.separator.clone(),
            comparator: Rc::clone(&self.comparator),
            default: RefCell::new(None),
        });
        let reader = Rc::clone(&state);
        ComputedProperty::new(move |owner| reader.get(owner))
            .with_setter(move |owner, value| state.set(owner, value))
            .depends_on(self.dependent_key.clone())
    }

    /// Instance-scoped wrapper installing [`computed`](Self::computed).
    #[must_use]
    pub fn scoped(&self) -> ScopedProperty {
        let this = self.clone();
        ScopedProperty::new(self.key.clone(), move || this.computed())
    }
}

impl Mixin for JoinedArray {
    fn install(self, class: &mut Class) {
        self.scoped().install(class);
    }
}

struct JoinedState {
    key: String,
    dependent_key: String,
    separator: String,
    comparator: Rc<Comparator>,
    default: RefCell<Option<Vec<Value>>>,
}

impl JoinedState {
    fn capture_default(&self, current: &Value) {
        let mut default = self.default.borrow_mut();
        if default.is_none() {
            let items = current.as_array().map(|a| a.snapshot()).unwrap_or_default();
            *default = Some(items);
        }
    }

    fn not_array(&self, found: &Value) -> WeftError {
        WeftError::NotArray {
            key: self.dependent_key.clone(),
            found: found.describe(),
        }
    }

    fn get(&self, owner: &Owner) -> Result<Value> {
        let current = owner.get(&self.dependent_key)?;
        self.capture_default(&current);
        match &current {
            Value::Absent => Ok(Value::Absent),
            Value::Array(array) => Ok(Value::Str(array.join(&self.separator))),
            other => Err(self.not_array(other)),
        }
    }

    fn set(&self, owner: &Owner, value: Value) -> Result<Value> {
        if !matches!(value, Value::Absent | Value::Str(_)) {
            return Err(WeftError::NotString {
                key: self.key.clone(),
                found: value.describe(),
            });
        }

        let current = owner.get(&self.dependent_key)?;
        self.capture_default(&current);

        let items = match &value {
            Value::Str(s) if s.is_empty() => Vec::new(),
            Value::Str(s) => self.split(s),
            _ => self.default.borrow().clone().unwrap_or_default(),
        };

        let array = current.as_array().ok_or_else(|| self.not_array(&current))?;
        merge(array, &items, &*self.comparator)?;
        let joined = array.join(&self.separator);

        tracing::debug!(
            message = "weft.joined.set",
            owner = owner.id(),
            key = %self.key,
            len = array.len()
        );
        Ok(Value::Str(joined))
    }

    fn split(&self, s: &str) -> Vec<Value> {
        if self.separator.is_empty() {
            s.chars().map(|c| Value::Str(c.to_string())).collect()
        } else {
            s.split(self.separator.as_str()).map(Value::from).collect()
        }
    }
}
