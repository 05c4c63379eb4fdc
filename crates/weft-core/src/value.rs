#![forbid(unsafe_code)]

//! Dynamic values stored under owner keys.

use std::fmt;

use crate::array::ObservableArray;

/// A value held by an owner slot or an array element.
///
/// Equality is strict: scalars compare by value, arrays by identity. Two
/// arrays with equal contents are different values unless they are the
/// same array.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Absent,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(ObservableArray),
}

impl Value {
    /// Build an array value from any sequence of convertible items.
    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Array(ObservableArray::from_iter(items.into_iter().map(Into::into)))
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Whether array behavior can be applied to this value.
    #[must_use]
    pub fn is_array_like(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ObservableArray> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short type-and-value rendering used in error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Absent => "absent".to_string(),
            Self::Bool(b) => format!("bool {b}"),
            Self::Int(n) => format!("int {n}"),
            Self::Str(s) => format!("string {s:?}"),
            Self::Array(a) => format!("array {} (len {})", a.id(), a.len()),
        }
    }

    /// Rendering of this value as one element of a joined string.
    ///
    /// Absent renders as the empty string; nested arrays render as their
    /// own comma-joined contents.
    #[must_use]
    pub fn join_fragment(&self) -> String {
        match self {
            Self::Absent => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Str(s) => s.clone(),
            Self::Array(a) => a.join(","),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join_fragment())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<ObservableArray> for Value {
    fn from(array: ObservableArray) -> Self {
        Self::Array(array)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}
