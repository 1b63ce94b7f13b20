//! Runtime tag → compile-time type/backend dispatch.

/// Bind a concrete element type to `$T` for the runtime tag `$dtype` and
/// evaluate `$body` with it.
///
/// ```
/// use kiln_core::{dtype_dispatch, DType};
///
/// let size = dtype_dispatch!(DType::I16, T => std::mem::size_of::<T>());
/// assert_eq!(size, 2);
/// ```
#[macro_export]
macro_rules! dtype_dispatch {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::DType::F16 => {
                type $T = $crate::half::f16;
                $body
            }
            $crate::DType::BF16 => {
                type $T = $crate::half::bf16;
                $body
            }
            $crate::DType::F64 => {
                type $T = f64;
                $body
            }
            $crate::DType::I8 => {
                type $T = i8;
                $body
            }
            $crate::DType::I16 => {
                type $T = i16;
                $body
            }
            $crate::DType::I32 => {
                type $T = i32;
                $body
            }
            $crate::DType::I64 => {
                type $T = i64;
                $body
            }
            $crate::DType::U8 => {
                type $T = u8;
                $body
            }
        }
    };
}

/// Bind the [`Primitives`](kiln_kernels::Primitives) implementation for
/// `$device` to `$p` and evaluate `$body` with it.
///
/// Returns `Err(DeviceUnavailable)` from the enclosing function when the
/// device's backend is not compiled in.
macro_rules! device_dispatch {
    ($device:expr, $p:ident => $body:expr) => {
        match $device {
            $crate::Device::Cpu => {
                let $p = ::kiln_kernels::CpuPrimitives;
                $body
            }
            #[cfg(feature = "cuda")]
            $crate::Device::Cuda(ordinal) => {
                let $p = ::kiln_kernels::cuda::CudaPrimitives::new(ordinal);
                $body
            }
            #[cfg(not(feature = "cuda"))]
            device @ $crate::Device::Cuda(_) => {
                return Err($crate::KilnError::DeviceUnavailable(device));
            }
        }
    };
}

pub(crate) use device_dispatch;
