//! Raw device memory primitives and host↔device transfer utilities.
//!
//! Device addresses travel through the `Primitives` API as `*mut T`; they are
//! converted back to `CUdeviceptr` before every driver call and never
//! dereferenced on the host.

use std::mem::{size_of, MaybeUninit};
use std::ptr::NonNull;

use cudarc::driver::result;
use cudarc::driver::sys::CUdeviceptr;

use super::context::bind;
use crate::primitives::Primitives;
use crate::{KernelError, Result};

/// Base alignment guaranteed by `cuMemAlloc`.
const CUDA_BASE_ALIGNMENT: usize = 256;

fn dptr<T>(ptr: *const T) -> CUdeviceptr {
    ptr as usize as CUdeviceptr
}

fn mem_err(op: &str, nbytes: usize, e: impl std::fmt::Display) -> KernelError {
    KernelError::MemoryError(format!("{}({} bytes): {}", op, nbytes, e))
}

/// Primitives for memory on one CUDA device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CudaPrimitives {
    ordinal: usize,
}

impl CudaPrimitives {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

impl Primitives for CudaPrimitives {
    fn alloc(&self, nbytes: usize, align: usize) -> Result<NonNull<u8>> {
        if nbytes == 0 || align == 0 || !align.is_power_of_two() || align > CUDA_BASE_ALIGNMENT {
            return Err(KernelError::InvalidLayout { nbytes, align });
        }
        bind(self.ordinal)?;
        // SAFETY: the context is current and the size is non-zero.
        let raw = unsafe {
            let raw = result::malloc_sync(nbytes).map_err(|e| mem_err("malloc", nbytes, e))?;
            result::memset_d8_sync(raw, 0, nbytes).map_err(|e| mem_err("memset", nbytes, e))?;
            raw
        };
        NonNull::new(raw as usize as *mut u8).ok_or(KernelError::OutOfMemory { nbytes, align })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, nbytes: usize, _align: usize) {
        if bind(self.ordinal).is_err() {
            return;
        }
        if let Err(e) = result::free_sync(dptr(ptr.as_ptr())) {
            tracing::warn!(ordinal = self.ordinal, nbytes, "cuMemFree failed: {}", e);
        }
    }

    unsafe fn fill<T: Copy>(&self, dst: *mut T, value: T, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        bind(self.ordinal)?;
        let staging = vec![value; count];
        result::memcpy_htod_sync(dptr(dst), &staging)
            .map_err(|e| mem_err("fill", count * size_of::<T>(), e))
    }

    unsafe fn copy<T: Copy>(&self, src: *const T, dst: *mut T, count: usize) -> Result<()> {
        if count == 0 || std::ptr::eq(src, dst) {
            return Ok(());
        }
        bind(self.ordinal)?;
        let nbytes = count * size_of::<T>();
        result::memcpy_dtod_sync(dptr(dst), dptr(src), nbytes).map_err(|e| mem_err("dtod", nbytes, e))
    }

    unsafe fn deref<T: Copy>(&self, src: *const T, offset: usize) -> Result<T> {
        bind(self.ordinal)?;
        let mut out = [MaybeUninit::<T>::uninit()];
        result::memcpy_dtoh_sync(&mut out, dptr(src.add(offset)))
            .map_err(|e| mem_err("deref", size_of::<T>(), e))?;
        Ok(out[0].assume_init())
    }
}

/// Copy `count` elements from host memory to device `ordinal` (H2D).
///
/// # Safety
/// `src` must be valid host memory and `dst` a device address on `ordinal`,
/// both covering `count` elements.
pub unsafe fn copy_host_to_device<T: Copy>(
    src: *const T,
    dst: *mut T,
    count: usize,
    ordinal: usize,
) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    bind(ordinal)?;
    let host = std::slice::from_raw_parts(src, count);
    result::memcpy_htod_sync(dptr(dst), host).map_err(|e| mem_err("htod", count * size_of::<T>(), e))
}

/// Copy `count` elements from device `ordinal` to host memory (D2H).
///
/// # Safety
/// `src` must be a device address on `ordinal` and `dst` valid host memory,
/// both covering `count` elements.
pub unsafe fn copy_device_to_host<T: Copy>(
    src: *const T,
    ordinal: usize,
    dst: *mut T,
    count: usize,
) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    bind(ordinal)?;
    let host = std::slice::from_raw_parts_mut(dst as *mut MaybeUninit<T>, count);
    result::memcpy_dtoh_sync(host, dptr(src)).map_err(|e| mem_err("dtoh", count * size_of::<T>(), e))
}

/// Copy `count` elements between two devices (D2D via host staging).
///
/// # Safety
/// `src` must be a device address on `src_ordinal` and `dst` one on
/// `dst_ordinal`, both covering `count` elements.
pub unsafe fn copy_device_to_device<T: Copy>(
    src: *const T,
    src_ordinal: usize,
    dst: *mut T,
    dst_ordinal: usize,
    count: usize,
) -> Result<()> {
    if src_ordinal == dst_ordinal {
        return CudaPrimitives::new(src_ordinal).copy(src, dst, count);
    }
    // Peer-to-peer access is not assumed; stage through host memory.
    let mut staging: Vec<MaybeUninit<T>> = Vec::with_capacity(count);
    staging.set_len(count);
    copy_device_to_host(src, src_ordinal, staging.as_mut_ptr() as *mut T, count)?;
    copy_host_to_device(staging.as_ptr() as *const T, dst, count, dst_ordinal)
}
