use std::ptr::NonNull;

use crate::Result;

/// Alignment in bytes of every buffer allocated through [`Primitives::alloc`]
/// by kiln containers.
pub const DEFAULT_ALIGNMENT: usize = 64;

/// Round `n` up to the next multiple of `align` (a power of two).
///
/// Returns `None` when the rounded size does not fit in `usize`.
pub fn align_up(n: usize, align: usize) -> Option<usize> {
    n.checked_add(align - 1).map(|padded| padded & !(align - 1))
}

/// Elementary memory operations for one device.
///
/// Pointers passed to and returned from these methods address memory on the
/// implementing device. For host memory they are ordinary pointers; for an
/// accelerator they are device addresses and must never be dereferenced on
/// the host.
///
/// Every operation is synchronous: when a method returns, its effect is
/// visible to any subsequent call on the same device.
pub trait Primitives {
    /// Allocate `nbytes` (> 0) of zero-initialized memory aligned to `align`.
    fn alloc(&self, nbytes: usize, align: usize) -> Result<NonNull<u8>>;

    /// Release memory obtained from [`Primitives::alloc`] on this device.
    ///
    /// # Safety
    /// `ptr` must come from `alloc` on the same device with the same
    /// `nbytes` and `align`, and must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, nbytes: usize, align: usize);

    /// Set `count` elements starting at `dst` to `value`.
    ///
    /// # Safety
    /// `dst` must be valid for `count` writes of `T` on this device.
    unsafe fn fill<T: Copy>(&self, dst: *mut T, value: T, count: usize) -> Result<()>;

    /// Copy `count` elements from `src` to `dst`. The regions may overlap.
    ///
    /// # Safety
    /// Both pointers must be valid for `count` elements of `T` on this device.
    unsafe fn copy<T: Copy>(&self, src: *const T, dst: *mut T, count: usize) -> Result<()>;

    /// Read the element at `src + offset`.
    ///
    /// # Safety
    /// `src + offset` must point to an initialized `T` on this device.
    unsafe fn deref<T: Copy>(&self, src: *const T, offset: usize) -> Result<T>;
}
