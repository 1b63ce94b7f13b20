//! Host memory primitives.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use crate::primitives::Primitives;
use crate::{KernelError, Result};

/// Primitives for host (CPU) memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuPrimitives;

fn host_layout(nbytes: usize, align: usize) -> Result<Layout> {
    if nbytes == 0 {
        return Err(KernelError::InvalidLayout { nbytes, align });
    }
    Layout::from_size_align(nbytes, align).map_err(|_| KernelError::InvalidLayout { nbytes, align })
}

impl Primitives for CpuPrimitives {
    fn alloc(&self, nbytes: usize, align: usize) -> Result<NonNull<u8>> {
        let layout = host_layout(nbytes, align)?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(raw).ok_or(KernelError::OutOfMemory { nbytes, align })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, nbytes: usize, align: usize) {
        match host_layout(nbytes, align) {
            Ok(layout) => alloc::dealloc(ptr.as_ptr(), layout),
            Err(e) => tracing::warn!(nbytes, align, "leaking host block: {}", e),
        }
    }

    unsafe fn fill<T: Copy>(&self, dst: *mut T, value: T, count: usize) -> Result<()> {
        if count > 0 {
            std::slice::from_raw_parts_mut(dst, count).fill(value);
        }
        Ok(())
    }

    unsafe fn copy<T: Copy>(&self, src: *const T, dst: *mut T, count: usize) -> Result<()> {
        if count > 0 && !ptr::eq(src, dst) {
            ptr::copy(src, dst, count);
        }
        Ok(())
    }

    unsafe fn deref<T: Copy>(&self, src: *const T, offset: usize) -> Result<T> {
        Ok(src.add(offset).read())
    }
}
