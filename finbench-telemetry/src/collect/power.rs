//! Power draw from sysfs power supplies.
//!
//! Uses `power_now` (µW) when the supply exposes it, otherwise
//! `current_now` (µA) × `voltage_now` (µV). Reported in mW.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{SampleError, Sampler};

const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

fn read_u64(path: &Path) -> Option<u64> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse::<i64>().ok())
        .map(|value| value.unsigned_abs())
}

/// Power draw of one supply directory, in mW.
pub fn supply_power_mw(supply: &Path) -> Option<f64> {
    if let Some(microwatts) = read_u64(&supply.join("power_now")) {
        return Some(microwatts as f64 / 1000.0);
    }
    let microamps = read_u64(&supply.join("current_now"))?;
    let microvolts = read_u64(&supply.join("voltage_now"))?;
    // µA × µV = pW.
    Some(microamps as f64 * microvolts as f64 / 1e9)
}

pub struct PowerSampler {
    root: PathBuf,
}

impl PowerSampler {
    pub fn new() -> Self {
        Self::with_root(POWER_SUPPLY_ROOT)
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl Default for PowerSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for PowerSampler {
    fn name(&self) -> &'static str {
        "power"
    }

    fn poll(&self) -> Result<f64, SampleError> {
        let entries =
            std::fs::read_dir(&self.root).map_err(|e| SampleError::read(&self.root, e))?;

        let mut supplies: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        supplies.sort();

        for supply in &supplies {
            if let Some(mw) = supply_power_mw(supply) {
                debug!(supply = %supply.display(), power_mw = mw, "Power sampled");
                return Ok(mw);
            }
        }

        Err(SampleError::Unavailable("power supply"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_now_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let bat = dir.path().join("BAT0");
        std::fs::create_dir(&bat).unwrap();
        std::fs::write(bat.join("power_now"), "2500000\n").unwrap();
        std::fs::write(bat.join("current_now"), "1\n").unwrap();
        std::fs::write(bat.join("voltage_now"), "1\n").unwrap();

        let mw = PowerSampler::with_root(dir.path()).poll().unwrap();
        assert_eq!(mw, 2500.0);
    }

    #[test]
    fn test_current_times_voltage_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let bat = dir.path().join("battery");
        std::fs::create_dir(&bat).unwrap();
        // Discharging supplies may report negative current.
        std::fs::write(bat.join("current_now"), "-500000\n").unwrap();
        std::fs::write(bat.join("voltage_now"), "4000000\n").unwrap();

        let mw = PowerSampler::with_root(dir.path()).poll().unwrap();
        assert!((mw - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_supply_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("AC")).unwrap();
        let err = PowerSampler::with_root(dir.path()).poll().unwrap_err();
        assert!(matches!(err, SampleError::Unavailable(_)));
    }
}
