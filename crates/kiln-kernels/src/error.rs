/// Errors raised by the device primitives.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("invalid allocation layout: {nbytes} bytes aligned to {align}")]
    InvalidLayout { nbytes: usize, align: usize },

    #[error("out of memory allocating {nbytes} bytes (align {align})")]
    OutOfMemory { nbytes: usize, align: usize },

    #[error("device init failed: {0}")]
    DeviceInit(String),

    #[error("device memory error: {0}")]
    MemoryError(String),
}
