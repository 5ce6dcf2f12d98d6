//! Device selection for candle-backed encoders and models.

use candle_core::Device;
use serde::{Deserialize, Serialize};

/// Device selection for model inference.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DeviceConfig {
    /// CPU inference.
    #[serde(rename = "cpu")]
    #[default]
    Cpu,
    /// CUDA GPU inference with the given ordinal.
    #[serde(rename = "cuda")]
    Cuda { ordinal: usize },
}

impl DeviceConfig {
    /// Convert to a candle `Device`.
    pub fn to_candle_device(&self) -> anyhow::Result<Device> {
        match self {
            DeviceConfig::Cpu => Ok(Device::Cpu),
            DeviceConfig::Cuda { ordinal } => Ok(Device::new_cuda(*ordinal)?),
        }
    }
}
