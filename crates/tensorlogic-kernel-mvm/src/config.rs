//! Per-call configuration for the partitioned kernels.

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::{KernelMvmError, Result};

/// Configuration shared by every partitioned MVM in one computation.
///
/// `dilation` controls chunk granularity: a range of length `L` is split into
/// blocks of `L / dilation` indices plus a remainder block. It changes peak
/// memory and batch count, never the result (up to summation order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MvmConfig {
    /// Chunk-count divisor
    pub dilation: usize,
    /// Evaluate independent chunks on the rayon pool
    pub parallel: bool,
    /// Execution device
    pub device: Device,
}

impl MvmConfig {
    /// Create a configuration with the given dilation, parallel chunks and CPU execution.
    pub fn new(dilation: usize) -> Self {
        Self {
            dilation,
            parallel: true,
            device: Device::cpu(),
        }
    }

    /// Enable or disable parallel chunk evaluation.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Select the execution device.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Check the configuration independently of any operand shape.
    pub fn validate(&self) -> Result<()> {
        if self.dilation == 0 {
            return Err(KernelMvmError::InvalidParameter {
                parameter: "dilation".to_string(),
                value: "0".to_string(),
                reason: "dilation must be a positive integer".to_string(),
            });
        }
        if !self.device.is_supported() {
            return Err(KernelMvmError::DeviceNotAvailable(self.device.to_string()));
        }
        Ok(())
    }

    /// Chunk size used for a range of length `len`.
    ///
    /// Fails when the dilation exceeds the range length, since that would ask
    /// for zero-sized chunks.
    pub fn chunk_size(&self, len: usize) -> Result<usize> {
        self.validate()?;
        let chunk_size = len / self.dilation;
        if chunk_size == 0 {
            return Err(KernelMvmError::InvalidParameter {
                parameter: "dilation".to_string(),
                value: self.dilation.to_string(),
                reason: format!("dilation exceeds the partitioned range length {}", len),
            });
        }
        Ok(chunk_size)
    }
}

impl Default for MvmConfig {
    fn default() -> Self {
        Self::new(2)
    }
}
