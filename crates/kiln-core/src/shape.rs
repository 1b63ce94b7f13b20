use smallvec::SmallVec;
use std::fmt;

use crate::error::KilnError;
use crate::Result;

/// Row-major strides, stack-allocated for ≤4 dimensions.
pub type Strides = SmallVec<[usize; 4]>;

/// Buffer shape with stack-allocated storage for ≤4 dimensions.
///
/// Rank 0 means "empty": a shape with no dimensions describes zero elements.
/// A single value is stored with shape `[1]`.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    /// Create a new shape from dimensions.
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: SmallVec::from_slice(dims),
        }
    }

    /// The empty shape (rank 0, no elements).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements; 0 for the empty shape.
    ///
    /// Saturates at `usize::MAX` when the product overflows; containers
    /// validate shapes with [`checked_numel`](Self::checked_numel).
    pub fn numel(&self) -> usize {
        self.checked_numel().unwrap_or(usize::MAX)
    }

    /// Total number of elements, failing when the product overflows `usize`.
    pub fn checked_numel(&self) -> Result<usize> {
        if self.dims.is_empty() {
            return Ok(0);
        }
        self.dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| KilnError::ShapeOverflow {
                shape: self.dims.to_vec(),
            })
    }

    /// Get dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Whether this shape has rank 0.
    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Resolve a possibly negative axis (`-1` is the last dimension).
    pub fn resolve_axis(&self, axis: isize) -> Result<usize> {
        let ndim = self.ndim();
        let resolved = if axis < 0 { axis + ndim as isize } else { axis };
        if resolved < 0 || resolved as usize >= ndim {
            return Err(KilnError::InvalidAxis { axis, ndim });
        }
        Ok(resolved as usize)
    }

    /// Size of a dimension, counting from the end when `axis` is negative.
    pub fn dim(&self, axis: isize) -> Result<usize> {
        Ok(self.dims[self.resolve_axis(axis)?])
    }

    /// Copy of this shape with dimension `axis` replaced by `size`.
    pub fn with_dim(&self, axis: usize, size: usize) -> Result<Shape> {
        if axis >= self.ndim() {
            return Err(KilnError::InvalidAxis {
                axis: axis as isize,
                ndim: self.ndim(),
            });
        }
        let mut dims = self.dims.clone();
        dims[axis] = size;
        Ok(Shape { dims })
    }

    /// Compute default strides for a contiguous row-major layout.
    pub fn contiguous_strides(&self) -> Strides {
        let ndim = self.dims.len();
        if ndim == 0 {
            return SmallVec::new();
        }
        let mut strides: Strides = SmallVec::from_elem(0usize, ndim);
        strides[ndim - 1] = 1;
        // Only shapes with a zero dimension can overflow here; they hold no
        // elements, so the saturated strides are never used to address memory.
        for i in (0..ndim - 1).rev() {
            strides[i] = strides[i + 1].saturating_mul(self.dims[i + 1]);
        }
        strides
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape {
            dims: SmallVec::from_vec(dims),
        }
    }
}

macro_rules! impl_shape_from_array {
    ($($n:expr),*) => {
        $(
            impl From<[usize; $n]> for Shape {
                fn from(dims: [usize; $n]) -> Self {
                    Shape::new(&dims)
                }
            }
        )*
    };
}

impl_shape_from_array!(0, 1, 2, 3, 4, 5, 6);
