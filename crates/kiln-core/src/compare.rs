//! Host-side comparison of two buffers, for tests.

use crate::buffer::TensorBuffer;
use crate::dtype::Element;
use crate::error::KilnError;
use crate::{dtype_dispatch, Device, Result};

/// Check that `got` matches `expected` in dtype, shape and values.
///
/// Both buffers are copied to the host first, so they may live on any
/// device. Floating-point elements may differ by at most `abs_diff`
/// (exact when `abs_diff == 0`); integer elements must be equal. Returns
/// the first mismatch found.
pub fn assert_buffers_close(got: &TensorBuffer<'_>, expected: &TensorBuffer<'_>, abs_diff: f64) -> Result<()> {
    if got.dtype() != expected.dtype() {
        return Err(KilnError::DTypeMismatch {
            expected: expected.dtype(),
            got: got.dtype(),
        });
    }
    if got.dims() != expected.dims() {
        return Err(KilnError::ShapeMismatch {
            expected: expected.dims().to_vec(),
            got: got.dims().to_vec(),
        });
    }
    let got = got.to(Device::Cpu)?;
    let expected = expected.to(Device::Cpu)?;
    dtype_dispatch!(got.dtype(), T => compare_values(got.data::<T>()?, expected.data::<T>()?, abs_diff))
}

fn compare_values<T: Element>(got: &[T], expected: &[T], abs_diff: f64) -> Result<()> {
    let tolerant = T::DTYPE.is_float() && abs_diff > 0.0;
    for (index, (&g, &e)) in got.iter().zip(expected).enumerate() {
        let close = if tolerant {
            (g.to_f64() - e.to_f64()).abs() <= abs_diff
        } else {
            g == e
        };
        if !close {
            return Err(KilnError::ValueMismatch {
                index,
                got: format!("{g:?}"),
                expected: format!("{e:?}"),
            });
        }
    }
    Ok(())
}
