//! Temperature from the sysfs thermal zone (millidegrees Celsius).

use std::path::{Path, PathBuf};

use super::{SampleError, Sampler};

const THERMAL_ZONE0: &str = "/sys/class/thermal/thermal_zone0/temp";

pub fn parse_millidegrees(content: &str) -> Result<f64, SampleError> {
    content
        .trim()
        .parse::<i64>()
        .map(|milli| milli as f64 / 1000.0)
        .map_err(|e| SampleError::parse("thermal zone", e.to_string()))
}

pub struct ThermalSampler {
    path: PathBuf,
}

impl ThermalSampler {
    pub fn new() -> Self {
        Self::with_path(THERMAL_ZONE0)
    }

    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for ThermalSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for ThermalSampler {
    fn name(&self) -> &'static str {
        "temperature"
    }

    fn poll(&self) -> Result<f64, SampleError> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| SampleError::read(&self.path, e))?;
        parse_millidegrees(&content)
    }
}
