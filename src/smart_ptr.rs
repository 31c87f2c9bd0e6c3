use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

use crate::errors::Result;
use crate::ptr_kind::{Kind, PtrKind, Shared, Unique};
use crate::raw_alloc;

/// An owning pointer whose discipline is chosen by `K`: [`Unique`] or
/// [`Shared`].
///
/// A handle is either empty or owns exactly one heap value. Unique handles
/// can only be moved; shared handles can also be cloned, and the value is
/// released when the last clone goes away.
///
/// ```
/// use smart_ptr::{make_shared_ptr, make_unique_ptr};
///
/// let p1 = make_shared_ptr(5);
/// let p2 = p1.clone();
/// assert_eq!(p1.count(), 2);
/// drop(p2);
/// assert_eq!(p1.count(), 1);
///
/// let mut u1 = make_unique_ptr(5);
/// let u2 = u1.take();
/// assert!(u1.get().is_null());
/// assert_eq!(*u2, 5);
/// ```
///
/// Unique handles cannot be copied:
///
/// ```compile_fail
/// use smart_ptr::{make_unique_ptr, SmartPtr, Unique};
///
/// let u1 = make_unique_ptr(5);
/// let u2: SmartPtr<i32, Unique> = u1.clone();
/// ```
///
/// and have no reference count:
///
/// ```compile_fail
/// let u1 = smart_ptr::make_unique_ptr(5);
/// let _ = u1.count();
/// ```
///
/// The count is not atomic, so handles never leave their thread:
///
/// ```compile_fail
/// let p = smart_ptr::make_shared_ptr(5);
/// std::thread::spawn(move || drop(p));
/// ```
pub struct SmartPtr<T, K: PtrKind> {
    /// Cached address. Only authoritative for unique handles; shared handles
    /// resolve through the control block.
    ptr: *mut T,
    block: K::Block<T>,
    _owns: PhantomData<T>,
}

impl<T, K: PtrKind> SmartPtr<T, K> {
    /// An empty handle. Allocates nothing.
    pub fn new() -> Self {
        Self {
            ptr: ptr::null_mut(),
            block: K::empty_block::<T>(),
            _owns: PhantomData,
        }
    }

    /// Takes ownership of `ptr`, which may be null.
    ///
    /// A shared handle allocates its control block here, aborting if the
    /// allocator fails. See [`SmartPtr::try_from_raw`].
    ///
    /// # Safety
    /// `ptr` must be null or come from `Box::into_raw` (or an equivalent
    /// global allocation with `Layout::new::<T>()`), and must not be freed or
    /// adopted by anything else afterwards.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        match NonNull::new(ptr) {
            Some(p) => Self {
                ptr,
                block: K::adopt(p),
                _owns: PhantomData,
            },
            None => Self::new(),
        }
    }

    /// Like [`SmartPtr::from_raw`], but returns an error when the control
    /// block cannot be allocated. `ptr` is released in that case.
    ///
    /// # Safety
    /// Same as [`SmartPtr::from_raw`].
    pub unsafe fn try_from_raw(ptr: *mut T) -> Result<Self> {
        match NonNull::new(ptr) {
            Some(p) => Ok(Self {
                ptr,
                block: K::try_adopt(p)?,
                _owns: PhantomData,
            }),
            None => Ok(Self::new()),
        }
    }

    /// The owned address, or null when empty.
    pub fn get(&self) -> *mut T {
        K::resolve(self.ptr, &self.block)
    }

    /// `true` iff the handle is empty.
    pub fn is_null(&self) -> bool {
        self.get().is_null()
    }

    /// `true` iff the handle owns a value.
    pub fn is_some(&self) -> bool {
        !self.is_null()
    }

    /// A reference to the owned value, `None` when empty.
    pub fn as_ref(&self) -> Option<&T> {
        unsafe { self.get().as_ref() }
    }

    /// Dereferences without checking for emptiness.
    ///
    /// # Safety
    /// The handle must not be empty.
    pub unsafe fn as_ref_unchecked(&self) -> &T {
        &*self.get()
    }

    /// The ownership discipline of this handle type.
    pub fn kind(&self) -> Kind {
        K::KIND
    }

    /// Releases the owned value (per the discipline's rule) and becomes
    /// empty.
    ///
    /// The handle is detached before the value is dropped, so it is already
    /// empty if that drop panics.
    pub fn reset(&mut self) {
        let ptr = mem::replace(&mut self.ptr, ptr::null_mut());
        unsafe { K::release(ptr, &mut self.block) };
    }

    /// Replaces the owned value with `ptr`.
    ///
    /// Does nothing when `ptr` is already the owned address. Otherwise the
    /// current value is released and `ptr` adopted; a null `ptr` leaves the
    /// handle empty.
    ///
    /// Addresses of zero-sized values are all alike, so for a zero-sized `T`
    /// a non-null `ptr` is always adopted as a new value.
    ///
    /// # Safety
    /// Same as [`SmartPtr::from_raw`]. For a zero-sized `T`, `ptr` must not
    /// be the value this handle already owns.
    pub unsafe fn reset_with(&mut self, ptr: *mut T) {
        let zero_sized = mem::size_of::<T>() == 0;
        if self.get() == ptr && (ptr.is_null() || !zero_sized) {
            return;
        }
        self.reset();
        if let Some(p) = NonNull::new(ptr) {
            self.block = K::adopt(p);
            self.ptr = ptr;
        }
    }

    /// Moves the value out into a new handle, leaving this one empty.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::new())
    }

    /// Frees a raw address owned outside of any handle and nulls it.
    ///
    /// # Safety
    /// `*ptr` must be null or satisfy the contract of [`SmartPtr::from_raw`].
    pub unsafe fn reset_raw(ptr: &mut *mut T) {
        if let Some(p) = NonNull::new(mem::replace(ptr, ptr::null_mut())) {
            raw_alloc::release(p);
        }
    }
}

impl<T> SmartPtr<T, Unique> {
    /// A mutable reference to the owned value, `None` when empty.
    pub fn as_mut(&mut self) -> Option<&mut T> {
        unsafe { self.ptr.as_mut() }
    }

    /// Gives up ownership without releasing. The caller becomes responsible
    /// for the returned address (see [`SmartPtr::from_raw`]).
    pub fn into_raw(self) -> *mut T {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }
}

impl<T> SmartPtr<T, Shared> {
    /// Number of live handles sharing the value, 0 when empty.
    pub fn count(&self) -> usize {
        Shared::count::<T>(&self.block).unwrap_or(0)
    }

    /// Whether both handles share one control block. Two empty handles
    /// compare equal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.block == other.block
    }

    /// Mutable access, only while this is the sole handle.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.count() == 1 {
            unsafe { self.get().as_mut() }
        } else {
            None
        }
    }
}

impl<T> Clone for SmartPtr<T, Shared> {
    fn clone(&self) -> Self {
        if let Some(b) = self.block {
            unsafe { b.as_ref() }.increment();
        }
        Self {
            ptr: self.ptr,
            block: self.block,
            _owns: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.ptr_eq(source) {
            return;
        }
        self.reset();
        if let Some(b) = source.block {
            unsafe { b.as_ref() }.increment();
        }
        self.ptr = source.ptr;
        self.block = source.block;
    }
}

impl<T, K: PtrKind> Drop for SmartPtr<T, K> {
    fn drop(&mut self) {
        unsafe { K::release(self.ptr, &mut self.block) };
    }
}

impl<T, K: PtrKind> Default for SmartPtr<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K: PtrKind> From<Box<T>> for SmartPtr<T, K> {
    fn from(value: Box<T>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(value)) }
    }
}

impl<T, K: PtrKind> Deref for SmartPtr<T, K> {
    type Target = T;

    /// # Panics
    /// Panics if the handle is empty. Use [`SmartPtr::as_ref`] to check
    /// first, or [`SmartPtr::as_ref_unchecked`] to skip the check.
    fn deref(&self) -> &T {
        match self.as_ref() {
            Some(v) => v,
            None => panic!("dereferenced an empty {} SmartPtr", K::KIND),
        }
    }
}

impl<T> DerefMut for SmartPtr<T, Unique> {
    fn deref_mut(&mut self) -> &mut T {
        match self.as_mut() {
            Some(v) => v,
            None => panic!("dereferenced an empty unique SmartPtr"),
        }
    }
}

impl<T: fmt::Debug, K: PtrKind> fmt::Debug for SmartPtr<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("SmartPtr");
        d.field("kind", &K::KIND).field("ptr", &self.get());
        if let Some(count) = K::count::<T>(&self.block) {
            d.field("count", &count);
        }
        d.field("value", &self.as_ref()).finish()
    }
}

/// Allocates `value` and wraps it in a unique handle.
pub fn make_unique_ptr<T>(value: T) -> SmartPtr<T, Unique> {
    SmartPtr::from(Box::new(value))
}

/// Allocates `value` and wraps it in a shared handle with a count of 1.
pub fn make_shared_ptr<T>(value: T) -> SmartPtr<T, Shared> {
    SmartPtr::from(Box::new(value))
}

/// [`make_unique_ptr`], reporting allocation failure instead of aborting.
pub fn try_make_unique_ptr<T>(value: T) -> Result<SmartPtr<T, Unique>> {
    let p = raw_alloc::try_box(value)?;
    unsafe { SmartPtr::try_from_raw(p.as_ptr()) }
}

/// [`make_shared_ptr`], reporting allocation failure instead of aborting.
pub fn try_make_shared_ptr<T>(value: T) -> Result<SmartPtr<T, Shared>> {
    let p = raw_alloc::try_box(value)?;
    unsafe { SmartPtr::try_from_raw(p.as_ptr()) }
}
