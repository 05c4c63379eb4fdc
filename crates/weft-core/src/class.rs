#![forbid(unsafe_code)]

//! Classes: per-instance defaults, init hooks, and mixins.
//!
//! A [`Class`] is a blueprint for [`Owner`]s. Creating an instance stores
//! fresh defaults, then the caller's initial values, then runs every init
//! hook exactly once in registration order. Hooks are where per-instance
//! machinery gets wired up (array observers, instance-scoped properties).
//!
//! # Example
//!
//! ```
//! use weft_core::class::Class;
//! use weft_core::value::Value;
//!
//! let todo = Class::new("Todo")
//!     .with_default("tags", || Value::array(["new"]))
//!     .on_init(|owner| owner.set("ready", Value::Bool(true)).map(drop));
//!
//! let a = todo.create().unwrap();
//! let b = todo.create().unwrap();
//! assert_ne!(a.get("tags").unwrap(), b.get("tags").unwrap());
//! assert_eq!(a.get("ready").unwrap(), Value::Bool(true));
//! ```

use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::owner::Owner;
use crate::value::Value;

/// Hook run once per instance during [`Class::create`].
pub type InitHook = Rc<dyn Fn(&Owner) -> Result<()>>;

type DefaultFactory = Rc<dyn Fn() -> Value>;

/// Reusable behavior that installs itself on a class.
pub trait Mixin {
    fn install(self, class: &mut Class);
}

/// Blueprint for owner instances.
#[derive(Clone)]
pub struct Class {
    name: String,
    defaults: Vec<(String, DefaultFactory)>,
    init_hooks: Vec<InitHook>,
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field(
                "defaults",
                &self.defaults.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .field("init_hooks", &self.init_hooks.len())
            .finish()
    }
}

impl Class {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: Vec::new(),
            init_hooks: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Give every instance its own default for `key`.
    ///
    /// `factory` runs once per instance, so array defaults are never shared.
    #[must_use]
    pub fn with_default(
        mut self,
        key: impl Into<String>,
        factory: impl Fn() -> Value + 'static,
    ) -> Self {
        self.defaults.push((key.into(), Rc::new(factory)));
        self
    }

    /// Run `hook` once for every new instance.
    #[must_use]
    pub fn on_init(mut self, hook: impl Fn(&Owner) -> Result<()> + 'static) -> Self {
        self.add_init_hook(Rc::new(hook));
        self
    }

    pub fn add_init_hook(&mut self, hook: InitHook) {
        self.init_hooks.push(hook);
    }

    /// Apply `mixin` to this class.
    #[must_use]
    pub fn with<M: Mixin>(mut self, mixin: M) -> Self {
        mixin.install(&mut self);
        self
    }

    #[must_use]
    pub fn init_hook_count(&self) -> usize {
        self.init_hooks.len()
    }

    pub fn create(&self) -> Result<Owner> {
        self.create_with(std::iter::empty::<(String, Value)>())
    }

    /// Create an instance, storing `props` over the defaults before the
    /// init hooks run.
    pub fn create_with<I, K>(&self, props: I) -> Result<Owner>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let owner = Owner::new(self.name.clone());
        for (key, factory) in &self.defaults {
            owner.set_silently(key, factory());
        }
        for (key, value) in props {
            owner.set_silently(key.as_ref(), value);
        }
        for hook in &self.init_hooks {
            hook(&owner)?;
        }
        tracing::debug!(
            message = "weft.owner.create",
            class = %self.name,
            owner = owner.id(),
            hooks = self.init_hooks.len()
        );
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WeftError;
    use std::cell::RefCell;

    #[test]
    fn defaults_are_fresh_per_instance() {
        let class = Class::new("List").with_default("items", || Value::array(["a"]));
        let a = class.create().unwrap();
        let b = class.create().unwrap();

        let items_a = a.get("items").unwrap();
        items_a.as_array().unwrap().push("b").unwrap();
        assert_eq!(items_a.join_fragment(), "a,b");
        assert_eq!(b.get("items").unwrap().join_fragment(), "a");
    }

    #[test]
    fn init_hooks_run_in_order_after_props() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let o1 = Rc::clone(&order);
        let o2 = Rc::clone(&order);
        let class = Class::new("Thing")
            .with_default("name", || Value::from("default"))
            .on_init(move |owner| {
                o1.borrow_mut().push(format!("first:{}", owner.get("name")?));
                Ok(())
            })
            .on_init(move |_| {
                o2.borrow_mut().push("second".to_string());
                Ok(())
            });

        class.create_with([("name", Value::from("given"))]).unwrap();
        assert_eq!(*order.borrow(), vec!["first:given", "second"]);
    }

    #[test]
    fn failing_hook_aborts_create() {
        let class = Class::new("Broken").on_init(|_| {
            Err(WeftError::NotArray {
                key: "items".to_string(),
                found: "absent".to_string(),
            })
        });
        assert!(matches!(class.create(), Err(WeftError::NotArray { .. })));
    }

    struct Tagged(&'static str);

    impl Mixin for Tagged {
        fn install(self, class: &mut Class) {
            let tag = self.0;
            class.add_init_hook(Rc::new(move |owner: &Owner| {
                owner.set("tag", Value::from(tag)).map(drop)
            }));
        }
    }

    #[test]
    fn mixins_add_init_hooks() {
        let class = Class::new("Thing").with(Tagged("blue"));
        assert_eq!(class.init_hook_count(), 1);
        let owner = class.create().unwrap();
        assert_eq!(owner.get("tag").unwrap(), Value::from("blue"));
    }
}
