//! Execution device carried by [`MvmConfig`](crate::MvmConfig).
//!
//! Device choice travels with each call; there is no process-wide platform
//! switch. The partitioned kernels run on the host CPU only.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compute device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceType {
    #[default]
    Cpu,
    Cuda,
    Metal,
}

/// A device type plus its index (for multi-GPU systems).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Device {
    pub device_type: DeviceType,
    pub index: usize,
}

impl Device {
    pub fn new(device_type: DeviceType, index: usize) -> Self {
        Self { device_type, index }
    }

    /// The host CPU.
    pub fn cpu() -> Self {
        Self::new(DeviceType::Cpu, 0)
    }

    /// Whether the chunked kernels can execute here.
    pub fn is_supported(&self) -> bool {
        self.device_type == DeviceType::Cpu
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device_type {
            DeviceType::Cpu => write!(f, "CPU"),
            DeviceType::Cuda => write!(f, "CUDA:{}", self.index),
            DeviceType::Metal => write!(f, "Metal:{}", self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_cpu() {
        assert_eq!(Device::default(), Device::cpu());
        assert!(Device::cpu().is_supported());
    }

    #[test]
    fn test_gpu_devices_unsupported() {
        assert!(!Device::new(DeviceType::Cuda, 0).is_supported());
        assert!(!Device::new(DeviceType::Metal, 0).is_supported());
    }

    #[test]
    fn test_display_names_device() {
        assert_eq!(Device::cpu().to_string(), "CPU");
        assert_eq!(Device::new(DeviceType::Cuda, 1).to_string(), "CUDA:1");
    }
}
