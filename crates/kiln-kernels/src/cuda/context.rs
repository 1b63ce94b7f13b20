//! CUDA device context management.
//!
//! Provides lazy-initialized singleton `CudaDevice` handles per GPU index.
//! Uses `cudarc` for safe CUDA driver API access.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use cudarc::driver::CudaDevice;
use parking_lot::Mutex;

use crate::{KernelError, Result};

/// Global registry of CUDA device handles (one per GPU index).
static DEVICES: OnceLock<Mutex<HashMap<usize, Arc<CudaDevice>>>> = OnceLock::new();

fn devices() -> &'static Mutex<HashMap<usize, Arc<CudaDevice>>> {
    DEVICES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get or create a CUDA device handle for the given GPU index.
///
/// The device is lazily initialized on first access and cached for reuse.
pub fn get_device(ordinal: usize) -> Result<Arc<CudaDevice>> {
    let mut map = devices().lock();
    if let Some(dev) = map.get(&ordinal) {
        return Ok(Arc::clone(dev));
    }
    let dev = CudaDevice::new(ordinal)
        .map_err(|e| KernelError::DeviceInit(format!("device {}: {}", ordinal, e)))?;
    tracing::debug!(ordinal, "initialized CUDA context");
    map.insert(ordinal, Arc::clone(&dev));
    Ok(dev)
}

/// Make the context of `ordinal` current on the calling thread.
///
/// Raw driver calls (allocation, memcpy) act on the current context, so every
/// primitive binds before touching device memory.
pub fn bind(ordinal: usize) -> Result<Arc<CudaDevice>> {
    let dev = get_device(ordinal)?;
    dev.bind_to_thread()
        .map_err(|e| KernelError::DeviceInit(format!("bind device {}: {}", ordinal, e)))?;
    Ok(dev)
}

/// Check if any CUDA device is available.
pub fn is_cuda_available() -> bool {
    get_device(0).is_ok()
}

/// Number of available CUDA devices.
pub fn device_count() -> usize {
    (0..16).take_while(|&i| get_device(i).is_ok()).count()
}
