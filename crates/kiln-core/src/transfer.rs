//! Element copies within one device and across devices.

use kiln_kernels::{CpuPrimitives, Primitives};

use crate::{Device, Element, Result};

/// Copy `count` elements from `src` on `src_device` to `dst` on `dst_device`.
///
/// Same-device copies go through that device's primitives; host↔accelerator
/// and accelerator↔accelerator pairs go through the cross-device paths.
///
/// # Safety
/// `src` and `dst` must address at least `count` elements of `T` on their
/// respective devices.
pub(crate) unsafe fn copy<T: Element>(
    src_device: Device,
    src: *const T,
    dst_device: Device,
    dst: *mut T,
    count: usize,
) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    if src_device != dst_device {
        let dtype = T::DTYPE;
        tracing::debug!(from = %src_device, to = %dst_device, count, %dtype, "cross-device copy");
    }
    match (src_device, dst_device) {
        (Device::Cpu, Device::Cpu) => Ok(CpuPrimitives.copy(src, dst, count)?),
        #[cfg(feature = "cuda")]
        (Device::Cpu, Device::Cuda(ordinal)) => {
            Ok(kiln_kernels::cuda::copy_host_to_device(src, dst, count, ordinal)?)
        }
        #[cfg(feature = "cuda")]
        (Device::Cuda(ordinal), Device::Cpu) => {
            Ok(kiln_kernels::cuda::copy_device_to_host(src, ordinal, dst, count)?)
        }
        #[cfg(feature = "cuda")]
        (Device::Cuda(from), Device::Cuda(to)) => {
            Ok(kiln_kernels::cuda::copy_device_to_device(src, from, dst, to, count)?)
        }
        #[cfg(not(feature = "cuda"))]
        (Device::Cuda(_), _) => Err(crate::KilnError::DeviceUnavailable(src_device)),
        #[cfg(not(feature = "cuda"))]
        (_, Device::Cuda(_)) => Err(crate::KilnError::DeviceUnavailable(dst_device)),
    }
}
