//! # kiln-core
//!
//! Dynamically typed, multi-device N-dimensional buffers.
//!
//! Provides the [`TensorBuffer`] container with:
//! - A runtime element type tag (F32, F16, BF16, F64, I8, I16, I32, I64, U8)
//! - CPU and CUDA device support
//! - Owned (64-byte aligned) or borrowed memory
//! - Capacity-aware resize, reshape and cross-device copies

pub mod buffer;
pub mod compare;
pub mod device;
mod dispatch;
pub mod dtype;
pub mod error;
pub mod prelude;
pub mod shape;
mod transfer;

pub use buffer::TensorBuffer;
pub use device::Device;
pub use dtype::{DType, Element};
pub use error::KilnError;
pub use shape::Shape;

pub use half;
pub use kiln_kernels as kernels;

pub type Result<T> = std::result::Result<T, KilnError>;
