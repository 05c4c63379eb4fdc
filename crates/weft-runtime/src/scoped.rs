#![forbid(unsafe_code)]

//! Computed properties whose closure state is private to each instance.
//!
//! A [`ScopedProperty`] holds a factory rather than a property. The factory
//! runs once per owner when the owner is initialized, and its result is
//! installed on that owner alone, so any cache captured by the getter or
//! setter belongs to exactly one instance.

use std::fmt;
use std::rc::Rc;

use weft_core::class::{Class, Mixin};
use weft_core::computed::ComputedProperty;
use weft_core::owner::{AttachToken, Owner};

type PropertyFactory = Rc<dyn Fn() -> ComputedProperty>;

#[derive(Clone)]
pub struct ScopedProperty {
    key: String,
    factory: PropertyFactory,
    token: AttachToken,
}

impl fmt::Debug for ScopedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedProperty")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ScopedProperty {
    pub fn new(key: impl Into<String>, factory: impl Fn() -> ComputedProperty + 'static) -> Self {
        Self {
            key: key.into(),
            factory: Rc::new(factory),
            token: AttachToken::next(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Build a fresh property and define it on `owner`.
    ///
    /// Returns `false` if this property was already installed there.
    pub fn install_on(&self, owner: &Owner) -> bool {
        if !owner.mark_attached(self.token) {
            return false;
        }
        owner.define_computed(&self.key, (self.factory)());
        true
    }
}

impl Mixin for ScopedProperty {
    fn install(self, class: &mut Class) {
        class.add_init_hook(Rc::new(move |owner: &Owner| {
            self.install_on(owner);
            Ok(())
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use weft_core::value::Value;

    fn counter() -> ScopedProperty {
        ScopedProperty::new("ticks", || {
            let count = Rc::new(Cell::new(0i64));
            ComputedProperty::new(move |_| {
                count.set(count.get() + 1);
                Ok(Value::Int(count.get()))
            })
        })
    }

    #[test]
    fn state_is_private_per_instance() {
        let class = Class::new("Clock").with(counter());
        let a = class.create().unwrap();
        let b = class.create().unwrap();

        assert_eq!(a.get("ticks").unwrap(), Value::Int(1));
        assert_eq!(a.get("ticks").unwrap(), Value::Int(2));
        assert_eq!(b.get("ticks").unwrap(), Value::Int(1));
    }

    #[test]
    fn install_on_runs_factory_once() {
        let owner = Owner::new("Clock");
        let property = counter();
        assert!(property.install_on(&owner));
        assert_eq!(owner.get("ticks").unwrap(), Value::Int(1));

        assert!(!property.install_on(&owner));
        assert_eq!(owner.get("ticks").unwrap(), Value::Int(2));
    }
}
