#![forbid(unsafe_code)]

//! Error type shared by every weft crate.

use thiserror::Error;

use crate::array::ArrayId;

pub type Result<T> = std::result::Result<T, WeftError>;

/// Failures raised while wiring or propagating reactive array state.
///
/// Everything except [`WeftError::OwnerDropped`] is a precondition
/// violation: the calling code broke a contract and the operation was
/// aborted instead of coercing the value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeftError {
    #[error("property `{key}` must hold an array, found {found}")]
    NotArray { key: String, found: String },

    #[error("property `{key}` only accepts a string or absent value, found {found}")]
    NotString { key: String, found: String },

    #[error("element {index} of `{key}` must itself be an array, found {found}")]
    NestedNotArray {
        key: String,
        index: usize,
        found: String,
    },

    #[error("array {array} was mutated from inside one of its own change callbacks")]
    ReentrantMutation { array: ArrayId },

    #[error("computed property `{key}` has no setter")]
    ReadOnly { key: String },

    #[error("owner instance was dropped")]
    OwnerDropped,
}

impl WeftError {
    /// Whether this error reports a broken caller contract.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        !matches!(self, Self::OwnerDropped)
    }
}
