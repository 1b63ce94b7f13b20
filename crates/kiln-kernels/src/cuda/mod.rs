//! CUDA backend for kiln buffers.
//!
//! Provides:
//! - Device context management (lazy singleton per GPU)
//! - Raw device allocation, fill, copy and single-element reads
//! - Host↔device and device↔device transfers

pub mod context;
pub mod memory;

pub use context::{device_count, get_device, is_cuda_available};
pub use memory::{copy_device_to_device, copy_device_to_host, copy_host_to_device, CudaPrimitives};
