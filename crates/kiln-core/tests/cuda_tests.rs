//! GPU integration tests for the CUDA buffer paths.
//! Run with: cargo test -p kiln-core --features cuda -- --nocapture

#![cfg(feature = "cuda")]

use kiln_core::compare::assert_buffers_close;
use kiln_core::{DType, Device, KilnError, TensorBuffer};

// ============================================================================
// Device transfer tests
// ============================================================================

#[test]
fn test_cpu_to_cuda_roundtrip() {
    let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
    let cpu = TensorBuffer::from_slice([2, 3], &data, Device::Cpu).unwrap();

    let gpu = cpu.to(Device::Cuda(0)).expect("Failed to move to GPU");
    assert_eq!(gpu.device(), Device::Cuda(0));
    assert_eq!(gpu.dims(), &[2, 3]);
    assert!(gpu.owns_data());

    let back = gpu.to(Device::Cpu).expect("Failed to move back to CPU");
    assert_eq!(back.data::<f32>().unwrap(), data.as_slice());
}

#[test]
fn test_roundtrip_all_dtypes() {
    for dtype in DType::ALL {
        let mut cpu = TensorBuffer::with_shape([3, 5], dtype, Device::Cpu).unwrap();
        kiln_core::dtype_dispatch!(dtype, T => {
            // small repeated bytes never form a NaN pattern
            let values: Vec<T> = (1..=15u8)
                .map(|i| bytemuck::pod_read_unaligned::<T>(&[i; 8][..dtype.size_in_bytes()]))
                .collect();
            cpu.copy_from_slice(&values).unwrap();
        });
        let back = cpu.to(Device::Cuda(0)).unwrap().to(Device::Cpu).unwrap();
        assert_buffers_close(&back, &cpu, 0.0).unwrap();
    }
}

#[test]
fn test_from_slice_on_device() {
    let gpu = TensorBuffer::from_slice([4], &[1i32, 2, 3, 4], Device::Cuda(0)).unwrap();
    assert_eq!(gpu.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(gpu.scalar_at::<i32>(&[2]).unwrap(), 3);
}

// ============================================================================
// Device-side operations
// ============================================================================

#[test]
fn test_fill_and_grow_on_device() {
    let mut gpu = TensorBuffer::full([2, 3], 1.0f32, Device::Cuda(0)).unwrap();
    gpu.grow(1, 1).unwrap();
    assert_eq!(gpu.dims(), &[2, 4]);
    gpu.fill(2.5f32).unwrap();
    assert_eq!(gpu.to_vec::<f32>().unwrap(), vec![2.5; 8]);
}

#[test]
fn test_device_copy_and_clone() {
    let a = TensorBuffer::full([16], 7u8, Device::Cuda(0)).unwrap();
    let b = a.try_clone().unwrap();
    assert_eq!(b.device(), Device::Cuda(0));
    assert_ne!(a.as_ptr::<u8>().unwrap(), b.as_ptr::<u8>().unwrap());
    assert_buffers_close(&b, &a, 0.0).unwrap();
}

#[test]
fn test_host_slices_rejected() {
    let mut gpu = TensorBuffer::full([2], 1.0f32, Device::Cuda(0)).unwrap();
    assert!(matches!(gpu.data::<f32>(), Err(KilnError::NotHostAddressable(Device::Cuda(0)))));
    assert!(matches!(gpu.at_mut::<f32>(0), Err(KilnError::NotHostAddressable(_))));
    assert!(gpu.as_ptr::<f32>().is_ok());
}
