use kiln_kernels::KernelError;

use crate::device::Device;
use crate::dtype::DType;

/// All errors that can occur within kiln-core.
///
/// The first four variants are the container's precondition checks; they
/// are always enabled, in release builds too.
#[derive(Debug, thiserror::Error)]
pub enum KilnError {
    /// Caller's element type does not match the buffer's type tag.
    #[error("dtype mismatch: buffer holds {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// Flat or multi-dimensional index past the logical size.
    #[error("index out of bounds: offset {offset} for buffer of size {size}")]
    OutOfBounds { offset: usize, size: usize },

    /// Reshape target does not hold the same number of elements.
    #[error("cannot reshape {numel} elements into shape {shape:?}")]
    InvalidReshape { numel: usize, shape: Vec<usize> },

    /// Copy source and destination element counts differ.
    #[error("size mismatch: destination holds {expected} elements, source has {got}")]
    SizeMismatch { expected: usize, got: usize },

    /// Element count of a shape does not fit in `usize`.
    #[error("element count of shape {shape:?} overflows usize")]
    ShapeOverflow { shape: Vec<usize> },

    /// Byte size of an allocation does not fit in `usize`.
    #[error("cannot allocate {count} elements of {dtype}: byte size overflows usize")]
    CapacityOverflow { count: usize, dtype: DType },

    #[error("dimension {axis} out of range for rank {ndim}")]
    InvalidAxis { axis: isize, ndim: usize },

    #[error("cannot shrink dimension {dim} of size {size} by {amount}")]
    InvalidShrink { dim: usize, size: usize, amount: usize },

    #[error("borrowed buffer of capacity {capacity} cannot grow to {requested} elements")]
    BorrowedGrowth { capacity: usize, requested: usize },

    #[error("memory on {0} is not host-addressable; copy it to cpu first")]
    NotHostAddressable(Device),

    #[error("device {0} is not available in this build")]
    DeviceUnavailable(Device),

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("value mismatch at index {index}: got {got}, expected {expected}")]
    ValueMismatch { index: usize, got: String, expected: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}
