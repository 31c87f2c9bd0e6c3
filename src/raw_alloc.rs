//! Global-allocator helpers that report failure instead of aborting.
//!
//! Memory handed out here uses `Layout::new::<T>()` from the global
//! allocator, which is exactly what `Box<T>` expects, so anything produced by
//! [`try_box`] may be released with [`release`] or `Box::from_raw`.

use std::alloc::{alloc, Layout};
use std::ptr::NonNull;

use crate::errors::{PtrError, Result};

/// Moves `value` onto the heap.
///
/// On allocation failure `value` is dropped and an error describing the
/// requested layout is returned.
pub(crate) fn try_box<T>(value: T) -> Result<NonNull<T>> {
    try_box_with(value, |layout| unsafe { alloc(layout) })
}

/// [`try_box`] with the raw allocation supplied by `allocate`, which must
/// return global-allocator memory for `layout` or null. It is not called for
/// zero-sized `T`.
pub(crate) fn try_box_with<T>(
    value: T,
    allocate: impl FnOnce(Layout) -> *mut u8,
) -> Result<NonNull<T>> {
    let layout = Layout::new::<T>();
    let ptr = if layout.size() == 0 {
        NonNull::<T>::dangling()
    } else {
        match NonNull::new(allocate(layout) as *mut T) {
            Some(p) => p,
            None => {
                tracing::warn!(
                    type_name = std::any::type_name::<T>(),
                    size = layout.size(),
                    "heap allocation failed"
                );
                return Err(PtrError::allocation_failed::<T>());
            }
        }
    };

    // SAFETY: `ptr` is either freshly allocated for `T` or a dangling,
    // well-aligned pointer to a zero-sized `T`.
    unsafe { ptr.as_ptr().write(value) };
    Ok(ptr)
}

/// Drops the pointee and frees its storage.
///
/// # Safety
/// `ptr` must come from [`try_box`] or `Box::into_raw` and must not be used
/// again afterwards.
pub(crate) unsafe fn release<T>(ptr: NonNull<T>) {
    drop(Box::from_raw(ptr.as_ptr()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{DropTally, Tracked};

    #[test]
    fn try_box_then_release_drops_the_value_once() {
        let tally = DropTally::new();
        let p = try_box(Tracked::new(3, &tally)).unwrap();
        assert_eq!(unsafe { p.as_ref() }.value(), 3);
        assert_eq!(tally.released(), 0);
        unsafe { release(p) };
        assert_eq!(tally.released(), 1);
    }

    #[test]
    fn try_box_handles_zero_sized_types() {
        #[derive(Debug, PartialEq)]
        struct Marker;

        let p = try_box(Marker).unwrap();
        assert_eq!(unsafe { p.as_ref() }, &Marker);
        unsafe { release(p) };
    }

    #[test]
    fn try_box_with_failed_allocation_drops_the_value() {
        let tally = DropTally::new();
        let result = try_box_with(Tracked::new(8, &tally), |_| std::ptr::null_mut());
        assert!(matches!(result, Err(PtrError::AllocationFailed { .. })));
        assert_eq!(tally.released(), 1);
    }

    #[test]
    fn try_box_memory_is_box_compatible() {
        let p = try_box(String::from("boxed")).unwrap();
        let b = unsafe { Box::from_raw(p.as_ptr()) };
        assert_eq!(*b, "boxed");
    }
}
