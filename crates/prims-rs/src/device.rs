use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PrimError;

/// Identifies where a tensor's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Cuda { index: u32 },
}

impl Device {
    pub fn is_cpu(self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda { index } => write!(f, "cuda:{index}"),
        }
    }
}

impl FromStr for Device {
    type Err = PrimError;

    /// Parses `"cpu"`, `"cuda"` (device 0), or `"cuda:<n>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda { index: 0 }),
            other => match other.strip_prefix("cuda:") {
                Some(index) => index
                    .parse::<u32>()
                    .map(|index| Device::Cuda { index })
                    .map_err(|_| PrimError::InvalidDevice {
                        spec: other.to_string(),
                    }),
                None => Err(PrimError::InvalidDevice {
                    spec: other.to_string(),
                }),
            },
        }
    }
}
