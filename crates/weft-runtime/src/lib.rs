#![forbid(unsafe_code)]

//! Runtime: keeps derived state in step with observable arrays.
//!
//! - [`merge`]: identity-preserving, order-preserving in-place merge.
//! - [`array_observer::ArrayChangeObserver`]: added/removed callbacks for an
//!   array-valued key, across mutation and reassignment.
//! - [`nested::NestedArrayObserver`]: per-element observation of arrays of
//!   arrays.
//! - [`scoped::ScopedProperty`]: computed properties with per-instance
//!   closure state.
//! - [`joined::JoinedArray`]: bidirectional string view over an array.
//!
//! All propagation is synchronous; callbacks run inside the call that
//! triggered the change.

pub mod array_observer;
pub mod joined;
pub mod merge;
pub mod nested;
pub mod scoped;

pub use array_observer::{ArrayCallbacks, ArrayChangeObserver, CallbackFns, ReplacementPolicy};
pub use joined::JoinedArray;
pub use merge::{MergePlan, identity, merge_identity, merge_vec, plan_merge};
pub use nested::{BoundObserver, NestedArrayObserver};
pub use scoped::ScopedProperty;
