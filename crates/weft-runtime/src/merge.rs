#![forbid(unsafe_code)]

//! In-place array merging that preserves identity and order.
//!
//! Merging `update` into `original` appends every update item that has no
//! match in `original`, then removes every `original` item that has no match
//! in `update`. Retained items keep their relative order, new items land at
//! the end, and `original` is never replaced by another array.
//!
//! The diff itself is [`plan_merge`], a pure function over slices. Applying
//! the plan to an [`ObservableArray`] goes through ordinary `push` and
//! `remove_at` calls, so array observers see the merge as a sequence of
//! regular mutations: appends first, in update order, then removals in
//! ascending original order.
//!
//! # Invariants
//!
//! 1. `merge(o, o)` leaves `o` unchanged.
//! 2. Afterwards every update item has a match in `original`, and every
//!    surviving item has a match in `update`.
//! 3. `update` is never mutated.

use weft_core::array::ObservableArray;
use weft_core::error::Result;
use weft_core::value::Value;

/// Equality predicate matching items across the two arrays.
pub type Comparator = dyn Fn(&Value, &Value) -> bool;

/// Default comparator: strict equality (identity for arrays).
#[must_use]
pub fn identity(a: &Value, b: &Value) -> bool {
    a == b
}

/// What a merge will do, computed without touching either input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan<T> {
    /// Update items to append, in update order.
    pub append: Vec<T>,
    /// Ascending indices into `original ++ append` to remove.
    pub remove: Vec<usize>,
}

impl<T> MergePlan<T> {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.append.is_empty() && self.remove.is_empty()
    }
}

/// Compute the merge of `update` into `original` under `eq`.
///
/// `eq` is called as `eq(update_item, original_item)` when deciding what to
/// append and as `eq(original_item, update_item)` when deciding what to
/// remove. An update item matching an earlier appended item is not appended
/// twice.
pub fn plan_merge<T, F>(original: &[T], update: &[T], eq: F) -> MergePlan<T>
where
    T: Clone,
    F: Fn(&T, &T) -> bool,
{
    let mut append: Vec<T> = Vec::new();
    for item in update {
        let present = original.iter().chain(append.iter()).any(|x| eq(item, x));
        if !present {
            append.push(item.clone());
        }
    }

    let remove = original
        .iter()
        .chain(append.iter())
        .enumerate()
        .filter(|&(_, item)| !update.iter().any(|x| eq(item, x)))
        .map(|(index, _)| index)
        .collect();

    MergePlan { append, remove }
}

/// Merge `update` into a plain vector in place.
pub fn merge_vec<T, F>(original: &mut Vec<T>, update: &[T], eq: F)
where
    T: Clone,
    F: Fn(&T, &T) -> bool,
{
    let plan = plan_merge(original.as_slice(), update, eq);
    original.extend(plan.append);
    let mut index = 0;
    original.retain(|_| {
        let keep = plan.remove.binary_search(&index).is_err();
        index += 1;
        keep
    });
}

/// Merge `update` into `original` in place, notifying its observers.
///
/// Returns `original` (the same array) for chaining.
pub fn merge(
    original: &ObservableArray,
    update: &[Value],
    eq: &Comparator,
) -> Result<ObservableArray> {
    let plan = plan_merge(&original.snapshot(), update, eq);
    if plan.is_noop() {
        return Ok(original.clone());
    }

    let appended = plan.append.len();
    for item in plan.append {
        original.push(item)?;
    }
    // Each removal shifts the later indices down by one.
    for (shift, index) in plan.remove.iter().enumerate() {
        original.remove_at(index - shift)?;
    }

    tracing::debug!(
        message = "weft.merge",
        array = original.id().raw(),
        appended,
        removed = plan.remove.len(),
        len = original.len()
    );
    Ok(original.clone())
}

/// [`merge`] with the [`identity`] comparator.
pub fn merge_identity(original: &ObservableArray, update: &[Value]) -> Result<ObservableArray> {
    merge(original, update, &identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn vals(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::from(*s)).collect()
    }

    #[test]
    fn plan_appends_missing_and_removes_stale() {
        let plan = plan_merge(&[1, 2, 3], &[2, 3, 4], |a, b| a == b);
        assert_eq!(plan.append, vec![4]);
        assert_eq!(plan.remove, vec![0]);
    }

    #[test]
    fn plan_does_not_append_duplicates_twice() {
        let plan = plan_merge(&[], &["c", "c"], |a, b| a == b);
        assert_eq!(plan.append, vec!["c"]);
        assert!(plan.remove.is_empty());
    }

    #[test]
    fn merge_vec_preserves_order_of_retained() {
        let mut original = vec!["a", "b", "c", "d"];
        merge_vec(&mut original, &["d", "e", "b"], |a, b| a == b);
        assert_eq!(original, vec!["b", "d", "e"]);
    }

    #[test]
    fn merge_vec_with_itself_is_noop() {
        let mut original = vec![3, 1, 2];
        let copy = original.clone();
        merge_vec(&mut original, &copy, |a, b| a == b);
        assert_eq!(original, copy);
    }

    #[test]
    fn merge_keeps_array_identity() {
        let array = ObservableArray::from_iter(vals(&["a", "b"]));
        let merged = merge_identity(&array, &vals(&["b", "c"])).unwrap();
        assert_eq!(merged, array);
        assert_eq!(array.join(","), "b,c");
    }

    #[test]
    fn merge_with_empty_update_clears() {
        let array = ObservableArray::from_iter(vals(&["a", "b"]));
        merge_identity(&array, &[]).unwrap();
        assert!(array.is_empty());
    }

    #[test]
    fn merge_notifies_appends_before_removals() {
        let array = ObservableArray::from_iter(vals(&["a", "b"]));
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _sub = array.on_change(move |a| {
            l.borrow_mut().push(a.join(","));
            Ok(())
        });

        merge_identity(&array, &vals(&["b", "c", "d"])).unwrap();
        assert_eq!(*log.borrow(), vec!["a,b,c", "a,b,c,d", "b,c,d"]);
    }

    #[test]
    fn merge_of_self_fires_nothing() {
        let array = ObservableArray::from_iter(vals(&["x", "y"]));
        let version = array.version();
        merge_identity(&array, &array.snapshot()).unwrap();
        assert_eq!(array.version(), version);
        assert_eq!(array.join(","), "x,y");
    }

    #[test]
    fn custom_comparator_matches_case_insensitively() {
        let array = ObservableArray::from_iter(vals(&["Apple", "pear"]));
        let ci = |a: &Value, b: &Value| {
            a.join_fragment().to_lowercase() == b.join_fragment().to_lowercase()
        };
        merge(&array, &vals(&["APPLE", "plum"]), &ci).unwrap();
        assert_eq!(array.join(","), "Apple,plum");
    }

    #[test]
    fn stale_duplicates_are_all_removed() {
        let array = ObservableArray::from_iter(vals(&["a", "x", "a", "b"]));
        merge_identity(&array, &vals(&["b"])).unwrap();
        assert_eq!(array.join(","), "b");
    }
}
