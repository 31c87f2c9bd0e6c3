//! Ownership policies for [`SmartPtr`](crate::SmartPtr).
//!
//! The policy is a zero-sized type parameter, so unique and shared pointers
//! are distinct types with distinct method sets and no runtime tag.

use std::alloc::Layout;
use std::cell::Cell;
use std::fmt;
use std::ptr::{self, NonNull};

use serde::Serialize;

use crate::errors::Result;
use crate::raw_alloc;

/// Names an ownership discipline at runtime, e.g. for reports and `Debug`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Unique,
    Shared,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Unique => f.write_str("unique"),
            Kind::Shared => f.write_str("shared"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// An ownership discipline. Implemented only by [`Unique`] and [`Shared`].
///
/// The methods are the bookkeeping hooks `SmartPtr` routes through; they are
/// not meant to be called directly.
pub trait PtrKind: sealed::Sealed + 'static {
    const KIND: Kind;

    /// Per-handle bookkeeping next to the raw address.
    type Block<T>;

    #[doc(hidden)]
    fn empty_block<T>() -> Self::Block<T>;

    /// # Safety
    /// `ptr` must be a `Box`-compatible allocation nobody else owns.
    #[doc(hidden)]
    unsafe fn adopt<T>(ptr: NonNull<T>) -> Self::Block<T>;

    /// Like [`PtrKind::adopt`], but reports bookkeeping allocation failure.
    /// The resource is released when that happens.
    ///
    /// # Safety
    /// Same as [`PtrKind::adopt`].
    #[doc(hidden)]
    unsafe fn try_adopt<T>(ptr: NonNull<T>) -> Result<Self::Block<T>>;

    /// The address currently owned, or null.
    #[doc(hidden)]
    fn resolve<T>(ptr: *mut T, block: &Self::Block<T>) -> *mut T;

    /// Live handle count, `None` for disciplines that don't count.
    #[doc(hidden)]
    fn count<T>(block: &Self::Block<T>) -> Option<usize>;

    /// Gives up this handle's ownership, leaving `block` empty.
    ///
    /// # Safety
    /// `ptr`/`block` must belong to one live handle, and the caller must
    /// null its address afterwards.
    #[doc(hidden)]
    unsafe fn release<T>(ptr: *mut T, block: &mut Self::Block<T>);
}

/// Exclusive ownership: one handle, move-only, no bookkeeping.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
pub struct Unique;

/// Reference-counted ownership through a heap [`ControlBlock`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
pub struct Shared;

impl sealed::Sealed for Unique {}
impl sealed::Sealed for Shared {}

impl PtrKind for Unique {
    const KIND: Kind = Kind::Unique;

    type Block<T> = ();

    fn empty_block<T>() {}

    unsafe fn adopt<T>(_ptr: NonNull<T>) {}

    unsafe fn try_adopt<T>(_ptr: NonNull<T>) -> Result<()> {
        Ok(())
    }

    fn resolve<T>(ptr: *mut T, _block: &()) -> *mut T {
        ptr
    }

    fn count<T>(_block: &()) -> Option<usize> {
        None
    }

    unsafe fn release<T>(ptr: *mut T, _block: &mut ()) {
        if let Some(p) = NonNull::new(ptr) {
            tracing::trace!(ptr = ?p, "releasing uniquely owned resource");
            raw_alloc::release(p);
        }
    }
}

impl PtrKind for Shared {
    const KIND: Kind = Kind::Shared;

    type Block<T> = Option<NonNull<ControlBlock<T>>>;

    fn empty_block<T>() -> Self::Block<T> {
        None
    }

    unsafe fn adopt<T>(ptr: NonNull<T>) -> Self::Block<T> {
        let block = NonNull::from(Box::leak(Box::new(ControlBlock::new(ptr))));
        tracing::trace!(block = ?block, ptr = ?ptr, "control block created");
        Some(block)
    }

    unsafe fn try_adopt<T>(ptr: NonNull<T>) -> Result<Self::Block<T>> {
        try_attach_block(ptr, |layout| unsafe { std::alloc::alloc(layout) })
    }

    fn resolve<T>(_ptr: *mut T, block: &Self::Block<T>) -> *mut T {
        match block {
            Some(b) => unsafe { b.as_ref() }.ptr.as_ptr(),
            None => ptr::null_mut(),
        }
    }

    fn count<T>(block: &Self::Block<T>) -> Option<usize> {
        Some(block.map_or(0, |b| unsafe { b.as_ref() }.count()))
    }

    unsafe fn release<T>(_ptr: *mut T, block: &mut Self::Block<T>) {
        let Some(b) = block.take() else {
            return;
        };
        let remaining = b.as_ref().decrement();
        tracing::trace!(block = ?b, remaining, "control block decremented");
        if remaining == 0 {
            raw_alloc::release(b);
        }
    }
}

/// Bookkeeping shared by every copy of a shared pointer: the owned address
/// and the number of live handles referencing it.
///
/// Dropping the block releases the resource.
pub struct ControlBlock<T> {
    ptr: NonNull<T>,
    count: Cell<usize>,
}

impl<T> ControlBlock<T> {
    fn new(ptr: NonNull<T>) -> Self {
        Self {
            ptr,
            count: Cell::new(1),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.get()
    }

    pub(crate) fn increment(&self) {
        // Same policy as `Rc`: overflowing the count can only come from
        // leaking handles, and continuing would allow a use-after-free.
        match self.count.get().checked_add(1) {
            Some(n) => self.count.set(n),
            None => std::process::abort(),
        }
    }

    fn decrement(&self) -> usize {
        let n = self.count.get() - 1;
        self.count.set(n);
        n
    }
}

/// Allocates a control block for `ptr` through `allocate`.
///
/// A control block that never reaches the heap is dropped on the error path,
/// which releases `ptr` with it.
///
/// # Safety
/// Same as [`PtrKind::adopt`].
pub(crate) unsafe fn try_attach_block<T>(
    ptr: NonNull<T>,
    allocate: impl FnOnce(Layout) -> *mut u8,
) -> Result<Option<NonNull<ControlBlock<T>>>> {
    let block = raw_alloc::try_box_with(ControlBlock::new(ptr), allocate)?;
    tracing::trace!(block = ?block, ptr = ?ptr, "control block created");
    Ok(Some(block))
}

impl<T> Drop for ControlBlock<T> {
    fn drop(&mut self) {
        tracing::trace!(ptr = ?self.ptr, "releasing shared resource");
        unsafe { raw_alloc::release(self.ptr) };
    }
}
