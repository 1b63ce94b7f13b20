use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use kiln_kernels::{align_up, Primitives, DEFAULT_ALIGNMENT};

use crate::dispatch::device_dispatch;
use crate::dtype::{DType, Element};
use crate::device::Device;
use crate::error::KilnError;
use crate::shape::{Shape, Strides};
use crate::{dtype_dispatch, transfer, Result};

/// Bytes reserved for `count` elements of `dtype`, rounded up to the
/// allocation alignment.
fn alloc_size(dtype: DType, count: usize) -> Result<usize> {
    count
        .checked_mul(dtype.size_in_bytes())
        .and_then(|nbytes| align_up(nbytes, DEFAULT_ALIGNMENT))
        .ok_or(KilnError::CapacityOverflow { count, dtype })
}

/// Return an owned block to the device it was allocated on.
fn free_owned(device: Device, ptr: NonNull<u8>, nbytes: usize) {
    match device {
        // SAFETY: the block was allocated by the same backend with this size.
        Device::Cpu => unsafe { kiln_kernels::CpuPrimitives.free(ptr, nbytes, DEFAULT_ALIGNMENT) },
        #[cfg(feature = "cuda")]
        Device::Cuda(ordinal) => unsafe {
            kiln_kernels::cuda::CudaPrimitives::new(ordinal).free(ptr, nbytes, DEFAULT_ALIGNMENT)
        },
        // Nothing can have been allocated on a backend that is not built.
        #[cfg(not(feature = "cuda"))]
        Device::Cuda(_) => {}
    }
}

/// A type-erased, shape-aware buffer on one device.
///
/// The buffer either owns its memory (allocated through the device's
/// primitives, 64-byte aligned, freed on drop or [`release`](Self::release))
/// or borrows memory owned elsewhere (never freed, never reallocated). The
/// lifetime `'a` bounds borrowed memory: owning buffers are
/// `TensorBuffer<'static>`, while [`view`](Self::view),
/// [`shallow_copy`](Self::shallow_copy) and [`assign`](Self::assign) tie the
/// buffer to the memory it aliases.
///
/// The element type is a runtime tag. Typed accessors take the element type
/// as a generic parameter and fail with [`KilnError::DTypeMismatch`] when it
/// does not match the tag.
///
/// Growing past the allocated capacity reallocates and **discards** the old
/// contents; shrinking keeps the allocation and the leading elements.
///
/// # Examples
///
/// ```
/// use kiln_core::{Device, TensorBuffer};
///
/// let mut buf = TensorBuffer::full([2, 3], 1.0f32, Device::Cpu).unwrap();
/// assert_eq!(buf.size(), 6);
///
/// buf.reshape([3, 2]).unwrap();
/// assert_eq!(buf.stride(0).unwrap(), 2);
///
/// buf.grow(1, 1).unwrap();
/// assert_eq!(buf.dims(), &[3, 3]);
/// ```
pub struct TensorBuffer<'a> {
    dtype: DType,
    device: Device,
    data: Option<NonNull<u8>>,
    own_data: bool,
    /// Elements physically available in `data`.
    allocated: usize,
    /// Bytes handed out by the allocator for `data`; 0 when borrowed.
    reserved: usize,
    /// Live elements; always `shape.numel()`.
    size: usize,
    shape: Shape,
    strides: Strides,
    _borrow: PhantomData<&'a mut [u8]>,
}

// SAFETY: the buffer is a single-owner value; shared access only reads and
// every mutation goes through `&mut self`. Borrowed memory is tied to `'a`.
unsafe impl Send for TensorBuffer<'_> {}
unsafe impl Sync for TensorBuffer<'_> {}

impl TensorBuffer<'static> {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create an empty buffer (rank 0, no memory).
    pub fn new(dtype: DType, device: Device) -> Self {
        Self {
            dtype,
            device,
            data: None,
            own_data: true,
            allocated: 0,
            reserved: 0,
            size: 0,
            shape: Shape::empty(),
            strides: Strides::new(),
            _borrow: PhantomData,
        }
    }

    /// Allocate a buffer of the given shape. Contents are unspecified.
    pub fn with_shape(shape: impl Into<Shape>, dtype: DType, device: Device) -> Result<Self> {
        let mut buffer = Self::new(dtype, device);
        buffer.resize(shape)?;
        Ok(buffer)
    }

    /// Allocate a buffer of the given shape with every element set to `value`.
    pub fn full<T: Element>(shape: impl Into<Shape>, value: T, device: Device) -> Result<Self> {
        let mut buffer = Self::with_shape(shape, T::DTYPE, device)?;
        buffer.fill(value)?;
        Ok(buffer)
    }

    /// Allocate a buffer on `device` and copy host `data` into it.
    pub fn from_slice<T: Element>(shape: impl Into<Shape>, data: &[T], device: Device) -> Result<Self> {
        let mut buffer = Self::with_shape(shape, T::DTYPE, device)?;
        buffer.copy_from_slice(data)?;
        Ok(buffer)
    }

    /// A single value stored with shape `[1]`.
    pub fn scalar<T: Element>(value: T, device: Device) -> Result<Self> {
        Self::full([1], value, device)
    }
}

impl<'a> TensorBuffer<'a> {
    /// Wrap host memory without copying. The buffer never frees it.
    pub fn from_slice_mut<T: Element>(shape: impl Into<Shape>, data: &'a mut [T]) -> Result<Self> {
        let mut buffer: TensorBuffer<'a> = TensorBuffer::new(T::DTYPE, Device::Cpu);
        buffer.assign(data, shape)?;
        Ok(buffer)
    }

    /// Wrap memory on any device without copying. The buffer never frees it.
    ///
    /// # Safety
    /// `data` must address `shape.numel()` elements of `T` on `device`,
    /// suitably aligned, and stay valid for `'a`.
    pub unsafe fn from_raw_parts<T: Element>(
        shape: impl Into<Shape>,
        data: *mut T,
        device: Device,
    ) -> Result<Self> {
        let mut buffer: TensorBuffer<'a> = TensorBuffer::new(T::DTYPE, device);
        buffer.assign_raw(data, shape)?;
        Ok(buffer)
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.ndim()
    }

    /// Number of live elements.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of elements the current allocation can hold.
    pub fn capacity(&self) -> usize {
        self.allocated
    }

    /// Bytes reserved by the current allocation.
    pub fn reserved_memory(&self) -> usize {
        if self.own_data {
            self.reserved
        } else {
            self.allocated.saturating_mul(self.dtype.size_in_bytes())
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.size == 1 && self.rank() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether this buffer holds memory it will free.
    pub fn owns_data(&self) -> bool {
        self.own_data && self.data.is_some()
    }

    /// Strides (in elements) for the row-major layout of the current shape.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Size of a dimension; negative values count from the end.
    pub fn dim(&self, axis: isize) -> Result<usize> {
        self.shape.dim(axis)
    }

    /// Stride of a dimension; negative values count from the end.
    pub fn stride(&self, axis: isize) -> Result<usize> {
        Ok(self.strides[self.shape.resolve_axis(axis)?])
    }

    // =========================================================================
    // Shape and capacity
    // =========================================================================

    /// Change the shape without touching memory. The element count must match.
    pub fn reshape(&mut self, new_shape: impl Into<Shape>) -> Result<&mut Self> {
        let shape = new_shape.into();
        if shape.checked_numel()? != self.size {
            return Err(KilnError::InvalidReshape {
                numel: self.size,
                shape: shape.dims().to_vec(),
            });
        }
        self.set_shape(shape);
        Ok(self)
    }

    /// Set a new shape, reallocating if it needs more than the capacity.
    ///
    /// Reallocation does not preserve the previous contents. When the new
    /// size fits, the allocation is reused and nothing is zeroed.
    pub fn resize(&mut self, new_shape: impl Into<Shape>) -> Result<&mut Self> {
        let shape = new_shape.into();
        let count = shape.checked_numel()?;
        if count > self.allocated {
            if !self.own_data && self.data.is_some() {
                return Err(KilnError::BorrowedGrowth {
                    capacity: self.allocated,
                    requested: count,
                });
            }
            tracing::debug!(
                dtype = %self.dtype,
                device = %self.device,
                from = self.allocated,
                to = count,
                "growing buffer"
            );
            self.allocate(count)?;
        }
        self.set_shape(shape);
        Ok(self)
    }

    /// Resize with dimension `dim` replaced by `new_size`.
    pub fn resize_dim(&mut self, dim: usize, new_size: usize) -> Result<&mut Self> {
        let shape = self.shape.with_dim(dim, new_size)?;
        self.resize(shape)
    }

    /// Resize to the shape of `other`.
    pub fn resize_as(&mut self, other: &TensorBuffer<'_>) -> Result<&mut Self> {
        self.resize(other.shape.clone())
    }

    /// Add `extra` to dimension `dim` (reallocates when over capacity).
    pub fn grow(&mut self, dim: usize, extra: usize) -> Result<&mut Self> {
        let size = self.dim_at(dim)?;
        let new_size = size.checked_add(extra).ok_or_else(|| KilnError::ShapeOverflow {
            shape: self.dims().to_vec(),
        })?;
        self.resize_dim(dim, new_size)
    }

    /// Remove `amount` from dimension `dim`. Never reallocates.
    pub fn shrink(&mut self, dim: usize, amount: usize) -> Result<&mut Self> {
        let size = self.dim_at(dim)?;
        let new_size = size
            .checked_sub(amount)
            .ok_or(KilnError::InvalidShrink { dim, size, amount })?;
        self.resize_dim(dim, new_size)
    }

    /// Make room for at least `capacity` elements.
    ///
    /// When a new allocation is needed the contents and shape are discarded;
    /// a borrowed buffer is detached from the memory it viewed.
    pub fn reserve(&mut self, capacity: usize) -> Result<&mut Self> {
        if capacity > self.allocated {
            self.allocate(capacity)?;
        }
        Ok(self)
    }

    /// Drop the shape and logical size, keeping the allocation for reuse.
    pub fn clear(&mut self) -> &mut Self {
        self.size = 0;
        self.shape = Shape::empty();
        self.strides.clear();
        self
    }

    /// Free owned memory (borrowed memory is left alone) and reset to empty.
    pub fn release(&mut self) -> &mut Self {
        if let Some(ptr) = self.data.take() {
            if self.own_data {
                let nbytes = self.reserved;
                tracing::trace!(dtype = %self.dtype, device = %self.device, nbytes, "releasing buffer");
                free_owned(self.device, ptr, nbytes);
            }
        }
        self.own_data = true;
        self.allocated = 0;
        self.reserved = 0;
        self.clear()
    }

    fn dim_at(&self, dim: usize) -> Result<usize> {
        self.shape.dims().get(dim).copied().ok_or(KilnError::InvalidAxis {
            axis: dim as isize,
            ndim: self.rank(),
        })
    }

    fn set_shape(&mut self, shape: Shape) {
        self.size = shape.numel();
        self.strides = shape.contiguous_strides();
        self.shape = shape;
    }

    /// Replace the current memory with a fresh owned block of `count` elements.
    fn allocate(&mut self, count: usize) -> Result<()> {
        let nbytes = alloc_size(self.dtype, count)?;
        self.release();
        if count == 0 {
            return Ok(());
        }
        let ptr = device_dispatch!(self.device, p => p.alloc(nbytes, DEFAULT_ALIGNMENT)?);
        tracing::trace!(dtype = %self.dtype, device = %self.device, nbytes, "allocated buffer");
        self.data = Some(ptr);
        self.own_data = true;
        self.allocated = count;
        self.reserved = nbytes;
        Ok(())
    }

    // =========================================================================
    // Ownership
    // =========================================================================

    /// Turn this buffer into a non-owning alias of `other`'s memory.
    ///
    /// Previously owned memory is released. The alias cannot outlive `other`,
    /// and `other` stays the owner.
    pub fn shallow_copy(&mut self, other: &'a mut TensorBuffer<'_>) -> &mut Self {
        self.release();
        self.dtype = other.dtype;
        self.device = other.device;
        self.data = other.data;
        self.own_data = false;
        self.allocated = other.allocated;
        self.reserved = 0;
        self.size = other.size;
        self.shape = other.shape.clone();
        self.strides = other.strides.clone();
        self
    }

    /// A non-owning alias of this buffer's memory.
    pub fn view(&mut self) -> TensorBuffer<'_> {
        let mut alias: TensorBuffer<'_> = TensorBuffer::new(self.dtype, self.device);
        alias.shallow_copy(self);
        alias
    }

    /// Make this buffer an owning, independent copy of `other`.
    ///
    /// The existing allocation is reused when it is owned, has the same
    /// dtype and device, and is large enough.
    pub fn deep_copy(&mut self, other: &TensorBuffer<'_>) -> Result<&mut Self> {
        if self.dtype != other.dtype || self.device != other.device || !self.own_data {
            self.release();
            self.dtype = other.dtype;
            self.device = other.device;
        }
        self.resize_as(other)?;
        self.copy_from(other)
    }

    /// An owning copy of this buffer on the same device.
    pub fn try_clone(&self) -> Result<TensorBuffer<'static>> {
        self.to(self.device)
    }

    /// Move the contents out, leaving this buffer empty. O(1).
    pub fn take(&mut self) -> TensorBuffer<'a> {
        let empty = TensorBuffer::new(self.dtype, self.device);
        std::mem::replace(self, empty)
    }

    /// Exchange the contents of two buffers. O(1).
    pub fn swap(&mut self, other: &mut TensorBuffer<'a>) {
        std::mem::swap(self, other);
    }

    /// An owning copy of this buffer on `device`.
    pub fn to(&self, device: Device) -> Result<TensorBuffer<'static>> {
        if device != self.device {
            tracing::debug!(from = %self.device, to = %device, dtype = %self.dtype, size = self.size, "device transfer");
        }
        let mut out = TensorBuffer::with_shape(self.shape.clone(), self.dtype, device)?;
        out.copy_from(self)?;
        Ok(out)
    }

    // =========================================================================
    // Data access
    // =========================================================================

    fn check_dtype<T: Element>(&self) -> Result<()> {
        if T::DTYPE != self.dtype {
            return Err(KilnError::DTypeMismatch {
                expected: self.dtype,
                got: T::DTYPE,
            });
        }
        Ok(())
    }

    fn check_host(&self) -> Result<()> {
        if !self.device.is_host_addressable() {
            return Err(KilnError::NotHostAddressable(self.device));
        }
        Ok(())
    }

    /// Pointer to the first element. Device memory must not be dereferenced
    /// on the host.
    pub fn as_ptr<T: Element>(&self) -> Result<*const T> {
        self.check_dtype::<T>()?;
        Ok(self.data.map_or(ptr::null(), |p| p.as_ptr() as *const T))
    }

    /// Mutable pointer to the first element.
    pub fn as_mut_ptr<T: Element>(&mut self) -> Result<*mut T> {
        self.check_dtype::<T>()?;
        Ok(self.data.map_or(ptr::null_mut(), |p| p.as_ptr() as *mut T))
    }

    /// The live elements as a slice (host memory only).
    pub fn data<T: Element>(&self) -> Result<&[T]> {
        self.check_dtype::<T>()?;
        self.check_host()?;
        match self.data {
            // SAFETY: dtype checked; `data` holds at least `size` elements.
            Some(p) if self.size > 0 => {
                Ok(unsafe { std::slice::from_raw_parts(p.as_ptr() as *const T, self.size) })
            }
            _ => Ok(&[]),
        }
    }

    /// The live elements as a mutable slice (host memory only).
    pub fn data_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        self.check_dtype::<T>()?;
        self.check_host()?;
        match self.data {
            // SAFETY: dtype checked; `data` holds at least `size` elements.
            Some(p) if self.size > 0 => {
                Ok(unsafe { std::slice::from_raw_parts_mut(p.as_ptr() as *mut T, self.size) })
            }
            _ => Ok(&mut []),
        }
    }

    /// Flat offset of a (possibly partial) multi-dimensional index:
    /// `sum(indices[i] * strides[i])`.
    pub fn offset_of(&self, indices: &[usize]) -> Result<usize> {
        if indices.len() > self.rank() {
            return Err(KilnError::InvalidAxis {
                axis: indices.len() as isize - 1,
                ndim: self.rank(),
            });
        }
        let out_of_bounds = KilnError::OutOfBounds {
            offset: usize::MAX,
            size: self.size,
        };
        let offset = indices
            .iter()
            .zip(self.strides.iter())
            .try_fold(0usize, |acc, (i, s)| i.checked_mul(*s)?.checked_add(acc))
            .ok_or(out_of_bounds)?;
        if offset >= self.size {
            return Err(KilnError::OutOfBounds {
                offset,
                size: self.size,
            });
        }
        Ok(offset)
    }

    /// Elements from `indices` to the end of the buffer (host memory only).
    pub fn index<T: Element>(&self, indices: &[usize]) -> Result<&[T]> {
        let data = self.data::<T>()?;
        let offset = self.offset_of(indices)?;
        Ok(&data[offset..])
    }

    /// Mutable elements from `indices` to the end of the buffer.
    pub fn index_mut<T: Element>(&mut self, indices: &[usize]) -> Result<&mut [T]> {
        let offset = self.offset_of(indices)?;
        let data = self.data_mut::<T>()?;
        Ok(&mut data[offset..])
    }

    /// Element at a flat index (host memory only).
    pub fn at<T: Element>(&self, index: usize) -> Result<&T> {
        let data = self.data::<T>()?;
        data.get(index).ok_or(KilnError::OutOfBounds {
            offset: index,
            size: self.size,
        })
    }

    pub fn at_mut<T: Element>(&mut self, index: usize) -> Result<&mut T> {
        let size = self.size;
        let data = self.data_mut::<T>()?;
        data.get_mut(index).ok_or(KilnError::OutOfBounds { offset: index, size })
    }

    /// Element at a multi-dimensional index (host memory only).
    pub fn at_index<T: Element>(&self, indices: &[usize]) -> Result<&T> {
        Ok(&self.index::<T>(indices)?[0])
    }

    pub fn at_index_mut<T: Element>(&mut self, indices: &[usize]) -> Result<&mut T> {
        Ok(&mut self.index_mut::<T>(indices)?[0])
    }

    /// Read one element on any device through the device's primitives.
    pub fn scalar_at<T: Element>(&self, indices: &[usize]) -> Result<T> {
        let src = self.as_ptr::<T>()?;
        let offset = self.offset_of(indices)?;
        // SAFETY: `offset < size` and `src` addresses `size` elements.
        let value = device_dispatch!(self.device, p => unsafe { p.deref(src, offset)? });
        Ok(value)
    }

    /// Set every live element to `value`.
    pub fn fill<T: Element>(&mut self, value: T) -> Result<&mut Self> {
        let dst = self.as_mut_ptr::<T>()?;
        if self.size == 0 {
            return Ok(self);
        }
        let count = self.size;
        // SAFETY: `dst` addresses `size` elements on this device.
        device_dispatch!(self.device, p => unsafe { p.fill(dst, value, count)? });
        Ok(self)
    }

    /// Copy all elements of `other` (same dtype and size, any device).
    pub fn copy_from(&mut self, other: &TensorBuffer<'_>) -> Result<&mut Self> {
        if other.dtype != self.dtype {
            return Err(KilnError::DTypeMismatch {
                expected: self.dtype,
                got: other.dtype,
            });
        }
        dtype_dispatch!(self.dtype, T => {
            let src = other.as_ptr::<T>()?;
            // SAFETY: `src` addresses `other.size` elements on `other.device`.
            unsafe { self.copy_from_raw(src, other.size, other.device)? };
        });
        Ok(self)
    }

    /// Copy host elements into this buffer. `data.len()` must equal `size()`.
    pub fn copy_from_slice<T: Element>(&mut self, data: &[T]) -> Result<&mut Self> {
        // SAFETY: a slice addresses `len` initialized host elements.
        unsafe { self.copy_from_raw(data.as_ptr(), data.len(), Device::Cpu) }
    }

    /// Copy `count` elements from `src` on `source_device`.
    ///
    /// # Safety
    /// `src` must address `count` elements of `T` on `source_device`.
    pub unsafe fn copy_from_raw<T: Element>(
        &mut self,
        src: *const T,
        count: usize,
        source_device: Device,
    ) -> Result<&mut Self> {
        let dst = self.as_mut_ptr::<T>()?;
        if count != self.size {
            return Err(KilnError::SizeMismatch {
                expected: self.size,
                got: count,
            });
        }
        transfer::copy(source_device, src, self.device, dst, count)?;
        Ok(self)
    }

    /// View host memory without copying. Owned memory is released first.
    pub fn assign<T: Element>(&mut self, data: &'a mut [T], shape: impl Into<Shape>) -> Result<&mut Self> {
        self.check_dtype::<T>()?;
        self.check_host()?;
        let shape = shape.into();
        let numel = shape.checked_numel()?;
        if numel != data.len() {
            return Err(KilnError::SizeMismatch {
                expected: numel,
                got: data.len(),
            });
        }
        // SAFETY: the slice holds `shape.numel()` elements and outlives `'a`.
        unsafe { self.assign_raw(data.as_mut_ptr(), shape) }
    }

    /// View memory on this buffer's device without copying.
    ///
    /// # Safety
    /// `data` must address `shape.numel()` elements of `T` on `self.device()`
    /// and stay valid for `'a`.
    pub unsafe fn assign_raw<T: Element>(&mut self, data: *mut T, shape: impl Into<Shape>) -> Result<&mut Self> {
        self.check_dtype::<T>()?;
        let shape = shape.into();
        let numel = shape.checked_numel()?;
        self.release();
        self.data = NonNull::new(data as *mut u8);
        self.own_data = false;
        self.allocated = numel;
        self.size = self.allocated;
        self.reshape(shape)
    }

    /// Copy the live elements to a host vector (any device).
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let src = self.as_ptr::<T>()?;
        let mut out = vec![<T as bytemuck::Zeroable>::zeroed(); self.size];
        // SAFETY: `src` addresses `size` elements; `out` has room for them.
        unsafe { transfer::copy(self.device, src, Device::Cpu, out.as_mut_ptr(), self.size)? };
        Ok(out)
    }
}

impl Drop for TensorBuffer<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for TensorBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TensorBuffer(dtype={}, device={}, shape={}, capacity={}, owned={})",
            self.dtype,
            self.device,
            self.shape,
            self.allocated,
            self.own_data,
        )
    }
}

impl fmt::Display for TensorBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 6;
        let values: Option<Vec<String>> = dtype_dispatch!(self.dtype, T => {
            self.to_vec::<T>().ok().map(|v| {
                v.iter().take(PREVIEW).map(|x| format!("{x:?}")).collect()
            })
        });
        match values {
            Some(mut values) => {
                if self.size > PREVIEW {
                    values.push("...".to_string());
                }
                writeln!(f, " {}", values.join(" "))?;
            }
            None => writeln!(f, " <unreadable>")?,
        }
        let dims: Vec<String> = self.dims().iter().map(|d| d.to_string()).collect();
        write!(f, "[{} {} buffer viewed as {}]", self.device, self.dtype, dims.join("x"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let b = TensorBuffer::new(DType::F32, Device::Cpu);
        assert!(b.is_empty());
        assert_eq!(b.rank(), 0);
        assert_eq!(b.capacity(), 0);
        assert!(!b.owns_data());
        assert!(b.data::<f32>().unwrap().is_empty());
    }

    #[test]
    fn test_with_shape_strides() {
        let b = TensorBuffer::with_shape([2, 3, 4], DType::I32, Device::Cpu).unwrap();
        assert_eq!(b.size(), 24);
        assert_eq!(b.strides(), &[12, 4, 1]);
        assert_eq!(b.stride(-1).unwrap(), 1);
        assert_eq!(b.stride(-3).unwrap(), 12);
        assert_eq!(b.dim(-2).unwrap(), 3);
        assert!(b.owns_data());
    }

    #[test]
    fn test_allocation_alignment() {
        let b = TensorBuffer::with_shape([3], DType::U8, Device::Cpu).unwrap();
        let ptr = b.as_ptr::<u8>().unwrap();
        assert_eq!(ptr as usize % DEFAULT_ALIGNMENT, 0);
        assert_eq!(b.reserved_memory(), 64);
    }

    #[test]
    fn test_full_and_scalar() {
        let b = TensorBuffer::full([2, 2], 7i64, Device::Cpu).unwrap();
        assert_eq!(b.data::<i64>().unwrap(), &[7, 7, 7, 7]);

        let s = TensorBuffer::scalar(2.5f64, Device::Cpu).unwrap();
        assert!(s.is_scalar());
        assert_eq!(s.dims(), &[1]);
        assert_eq!(*s.at::<f64>(0).unwrap(), 2.5);
    }

    #[test]
    fn test_from_slice_size_checked() {
        let err = TensorBuffer::from_slice([2, 2], &[1.0f32, 2.0, 3.0], Device::Cpu);
        assert!(matches!(err, Err(KilnError::SizeMismatch { expected: 4, got: 3 })));
    }

    #[test]
    fn test_dtype_checked() {
        let mut b = TensorBuffer::full([2], 1.0f32, Device::Cpu).unwrap();
        assert!(matches!(
            b.data::<i32>(),
            Err(KilnError::DTypeMismatch { expected: DType::F32, got: DType::I32 })
        ));
        assert!(b.fill(3u8).is_err());
        assert!(b.at::<f64>(0).is_err());
        assert_eq!(b.data::<f32>().unwrap(), &[1.0, 1.0]);
    }

    #[test]
    fn test_reshape_keeps_memory() {
        let mut b = TensorBuffer::from_slice([2, 3], &[0, 1, 2, 3, 4, 5i32], Device::Cpu).unwrap();
        let before = b.as_ptr::<i32>().unwrap();
        b.reshape([3, 2]).unwrap();
        assert_eq!(b.as_ptr::<i32>().unwrap(), before);
        assert_eq!(b.strides(), &[2, 1]);
        assert_eq!(*b.at_index::<i32>(&[2, 1]).unwrap(), 5);
    }

    #[test]
    fn test_reshape_rejects_count_change() {
        let mut b = TensorBuffer::with_shape([2, 3], DType::F32, Device::Cpu).unwrap();
        let err = b.reshape([4, 2]).unwrap_err();
        assert!(matches!(err, KilnError::InvalidReshape { numel: 6, .. }));
        assert_eq!(b.dims(), &[2, 3]);
    }

    #[test]
    fn test_shrink_keeps_allocation_and_prefix() {
        let mut b = TensorBuffer::from_slice([2, 3], &[1, 2, 3, 4, 5, 6u8], Device::Cpu).unwrap();
        let before = b.as_ptr::<u8>().unwrap();
        b.shrink(0, 1).unwrap();
        assert_eq!(b.dims(), &[1, 3]);
        assert_eq!(b.capacity(), 6);
        assert_eq!(b.as_ptr::<u8>().unwrap(), before);
        assert_eq!(b.data::<u8>().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_shrink_underflow() {
        let mut b = TensorBuffer::with_shape([2, 3], DType::F32, Device::Cpu).unwrap();
        assert!(matches!(
            b.shrink(1, 4),
            Err(KilnError::InvalidShrink { dim: 1, size: 3, amount: 4 })
        ));
        assert!(matches!(b.grow(2, 1), Err(KilnError::InvalidAxis { .. })));
    }

    #[test]
    fn test_reserve_discards_shape() {
        let mut b = TensorBuffer::full([2], 1i16, Device::Cpu).unwrap();
        b.reserve(1).unwrap();
        assert_eq!(b.dims(), &[2]); // already large enough

        b.reserve(10).unwrap();
        assert_eq!(b.capacity(), 10);
        assert!(b.is_empty());
        assert_eq!(b.rank(), 0);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut b = TensorBuffer::with_shape([4, 4], DType::F16, Device::Cpu).unwrap();
        b.clear();
        assert!(b.is_empty());
        assert_eq!(b.capacity(), 16);
        assert!(b.owns_data());
        b.resize([2, 8]).unwrap();
        assert_eq!(b.capacity(), 16);
    }

    #[test]
    fn test_release() {
        let mut b = TensorBuffer::with_shape([8], DType::F32, Device::Cpu).unwrap();
        b.release();
        assert!(b.is_empty());
        assert_eq!(b.capacity(), 0);
        assert_eq!(b.reserved_memory(), 0);
        assert!(!b.owns_data());
    }

    #[test]
    fn test_offset_bounds() {
        let b = TensorBuffer::with_shape([2, 3], DType::F32, Device::Cpu).unwrap();
        assert_eq!(b.offset_of(&[1, 2]).unwrap(), 5);
        assert_eq!(b.offset_of(&[1]).unwrap(), 3);
        assert!(matches!(b.offset_of(&[2, 0]), Err(KilnError::OutOfBounds { offset: 6, size: 6 })));
        assert!(matches!(b.offset_of(&[0, 0, 0]), Err(KilnError::InvalidAxis { .. })));
        assert!(matches!(b.at::<f32>(6), Err(KilnError::OutOfBounds { offset: 6, size: 6 })));
    }

    #[test]
    fn test_offset_overflow_rejected() {
        let b = TensorBuffer::with_shape([2, 3], DType::F32, Device::Cpu).unwrap();
        // 3 * (usize::MAX / 3 + 1) wraps to 2 without checked arithmetic
        assert!(matches!(
            b.offset_of(&[usize::MAX / 3 + 1, 0]),
            Err(KilnError::OutOfBounds { size: 6, .. })
        ));
        assert!(matches!(b.offset_of(&[1, usize::MAX]), Err(KilnError::OutOfBounds { .. })));
        assert!(b.at_index::<f32>(&[usize::MAX / 3 + 1, 0]).is_err());
    }

    #[test]
    fn test_byte_size_overflow_rejected() {
        let err = TensorBuffer::with_shape([(1 << 61) + 1], DType::F64, Device::Cpu).unwrap_err();
        assert!(matches!(err, KilnError::CapacityOverflow { dtype: DType::F64, .. }));

        let err = TensorBuffer::with_shape([usize::MAX / 4], DType::F32, Device::Cpu).unwrap_err();
        assert!(matches!(err, KilnError::CapacityOverflow { .. }));

        // representable in usize but not a valid host layout
        let err = TensorBuffer::with_shape([1 << 60], DType::F64, Device::Cpu).unwrap_err();
        assert!(matches!(err, KilnError::Kernel(_)));
    }

    #[test]
    fn test_failed_growth_keeps_buffer() {
        let mut b = TensorBuffer::from_slice([2], &[1.0f64, 2.0], Device::Cpu).unwrap();
        let ptr = b.as_ptr::<f64>().unwrap();

        assert!(b.resize([(1 << 61) + 1]).is_err());
        assert!(b.reserve(usize::MAX).is_err());
        assert!(matches!(b.grow(0, usize::MAX), Err(KilnError::ShapeOverflow { .. })));

        assert_eq!(b.as_ptr::<f64>().unwrap(), ptr);
        assert_eq!(b.capacity(), 2);
        assert_eq!(b.reserved_memory(), 64);
        assert_eq!(b.data::<f64>().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_shape_overflow_rejected() {
        let err = TensorBuffer::with_shape([(1 << 63) + 1, 2], DType::U8, Device::Cpu).unwrap_err();
        assert!(matches!(err, KilnError::ShapeOverflow { .. }));

        let mut external = [0u8; 2];
        let mut b = TensorBuffer::with_shape([2], DType::U8, Device::Cpu).unwrap();
        assert!(matches!(b.reshape([(1 << 63) + 1, 2]), Err(KilnError::ShapeOverflow { .. })));
        assert_eq!(b.dims(), &[2]);

        assert!(matches!(
            b.assign(&mut external, [(1 << 63) + 1, 2]),
            Err(KilnError::ShapeOverflow { .. })
        ));
        assert!(b.owns_data());
    }

    #[test]
    fn test_index_and_mutation() {
        let mut b = TensorBuffer::full([2, 3], 0i32, Device::Cpu).unwrap();
        *b.at_index_mut::<i32>(&[1, 0]).unwrap() = 9;
        *b.at_mut::<i32>(1).unwrap() = 4;
        assert_eq!(b.index::<i32>(&[1]).unwrap(), &[9, 0, 0]);
        assert_eq!(b.scalar_at::<i32>(&[0, 1]).unwrap(), 4);
        b.index_mut::<i32>(&[1, 1]).unwrap()[1] = 3;
        assert_eq!(b.data::<i32>().unwrap(), &[0, 4, 0, 9, 0, 3]);
    }

    #[test]
    fn test_take_leaves_source_empty() {
        let mut a = TensorBuffer::full([3], 1u8, Device::Cpu).unwrap();
        let b = a.take();
        assert_eq!(a.size(), 0);
        assert!(!a.owns_data());
        assert_eq!(a.dtype(), DType::U8);
        assert_eq!(b.data::<u8>().unwrap(), &[1, 1, 1]);
    }

    #[test]
    fn test_debug_display() {
        let b = TensorBuffer::from_slice([2, 4], &[1, 2, 3, 4, 5, 6, 7, 8i32], Device::Cpu).unwrap();
        let debug = format!("{:?}", b);
        assert!(debug.contains("TensorBuffer"));
        assert!(debug.contains("i32"));

        let display = format!("{}", b);
        assert!(display.contains("1 2 3 4 5 6 ..."));
        assert!(display.ends_with("[cpu i32 buffer viewed as 2x4]"));
    }
}
