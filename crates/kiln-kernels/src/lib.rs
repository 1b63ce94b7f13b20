//! # kiln-kernels
//!
//! Per-device memory primitives for kiln buffers.
//!
//! Provides:
//! - The [`Primitives`] trait: aligned allocation, bulk fill, element copy,
//!   and single-element reads, one implementation per device
//! - [`CpuPrimitives`] for host memory
//! - CUDA primitives and host↔device transfers (behind `cuda` feature)
//!
//! Everything here works on raw pointers and element counts. Tagging memory
//! with an element type and a device is the job of `kiln-core`.

pub mod cpu;
pub mod error;
pub mod primitives;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use cpu::CpuPrimitives;
pub use error::KernelError;
pub use primitives::{align_up, Primitives, DEFAULT_ALIGNMENT};

pub type Result<T> = std::result::Result<T, KernelError>;
