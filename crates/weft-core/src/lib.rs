#![forbid(unsafe_code)]

//! Core: the host object model that weft's reactive layer is built on.
//!
//! - [`value::Value`]: dynamic values with strict (identity for arrays)
//!   equality.
//! - [`array::ObservableArray`]: shared arrays with two-phase mutation
//!   hooks.
//! - [`owner::Owner`]: instances with keyed slots, computed accessors, and
//!   reference-level key observers.
//! - [`class::Class`]: blueprints with per-instance defaults, init hooks,
//!   and mixins.

pub mod array;
pub mod class;
pub mod computed;
pub mod error;
pub mod owner;
pub mod subscription;
pub mod value;

pub use array::{ArrayId, ArrayObserver, ObservableArray};
pub use class::{Class, InitHook, Mixin};
pub use computed::ComputedProperty;
pub use error::{Result, WeftError};
pub use owner::{AttachToken, Owner, WeakOwner};
pub use subscription::Subscription;
pub use value::Value;
