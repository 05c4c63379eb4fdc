#![forbid(unsafe_code)]

//! weft: arrays that keep derived state in step.
//!
//! Re-exports the object model from `weft-core` and the propagation layer
//! from `weft-runtime`. Most users only need the [`prelude`].
//!
//! ```
//! use weft::prelude::*;
//!
//! let article = Class::new("Article")
//!     .with_default("tags", || Value::array(["rust"]))
//!     .with(JoinedArray::new("tag_list", "tags"))
//!     .create()?;
//!
//! article.set("tag_list", "rust,sync".into())?;
//! let tags = article.get("tags")?;
//! assert_eq!(tags.as_array().map(ObservableArray::len), Some(2));
//! # Ok::<(), WeftError>(())
//! ```

pub use weft_core as core;
pub use weft_runtime as runtime;

pub mod prelude {
    pub use weft_core::{
        ArrayObserver, Class, ComputedProperty, Mixin, ObservableArray, Owner, Result,
        Subscription, Value, WeftError,
    };
    pub use weft_runtime::{
        ArrayCallbacks, ArrayChangeObserver, CallbackFns, JoinedArray, NestedArrayObserver,
        ReplacementPolicy, ScopedProperty,
    };
}
