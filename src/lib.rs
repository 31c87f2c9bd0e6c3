//! An owning pointer with two compile-time ownership disciplines.
//!
//! - [`SmartPtr<T, Unique>`](SmartPtr): exclusive, move-only.
//! - [`SmartPtr<T, Shared>`](SmartPtr): reference-counted through a heap
//!   control block, cloneable.
//!
//! Handles are single-threaded (`!Send + !Sync`): the reference count is a
//! plain `Cell`, so sharing across threads is rejected at compile time.
//!
//! Allocation failure aborts in the plain constructors, like `Box` and `Rc`.
//! The `try_*` constructors report it as a [`PtrError`] instead.

pub mod errors;
pub mod ptr_kind;
mod raw_alloc;
pub mod scenario;
pub mod smart_ptr;

pub use errors::{PtrError, Result};
pub use ptr_kind::{Kind, PtrKind, Shared, Unique};
pub use smart_ptr::{
    make_shared_ptr, make_unique_ptr, try_make_shared_ptr, try_make_unique_ptr, SmartPtr,
};
