//! Memory load from /proc/meminfo.

use std::path::{Path, PathBuf};

use super::{SampleError, Sampler};

const PROC_MEMINFO: &str = "/proc/meminfo";

/// The two /proc/meminfo fields needed for a load percentage, in kB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemInfo {
    pub fn parse(content: &str) -> Result<Self, SampleError> {
        let mut total = None;
        let mut available = None;

        for line in content.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let slot = match key.trim() {
                "MemTotal" => &mut total,
                "MemAvailable" => &mut available,
                _ => continue,
            };
            let value = rest
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<u64>().ok())
                .ok_or_else(|| SampleError::parse("/proc/meminfo", line.to_string()))?;
            *slot = Some(value);
        }

        match (total, available) {
            (Some(total_kb), Some(available_kb)) => Ok(Self {
                total_kb,
                available_kb,
            }),
            _ => Err(SampleError::parse(
                "/proc/meminfo",
                "missing MemTotal or MemAvailable",
            )),
        }
    }

    pub fn used_percent(&self) -> f64 {
        if self.total_kb == 0 {
            return 0.0;
        }
        let used = self.total_kb.saturating_sub(self.available_kb);
        (used as f64 / self.total_kb as f64) * 100.0
    }
}

pub struct MemorySampler {
    path: PathBuf,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self::with_path(PROC_MEMINFO)
    }

    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for MemorySampler {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn poll(&self) -> Result<f64, SampleError> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| SampleError::read(&self.path, e))?;
        Ok(MemInfo::parse(&content)?.used_percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       16000000 kB
MemFree:         2000000 kB
MemAvailable:    4000000 kB
Buffers:          100000 kB
";

    #[test]
    fn test_parse_meminfo() {
        let info = MemInfo::parse(MEMINFO).unwrap();
        assert_eq!(info.total_kb, 16_000_000);
        assert_eq!(info.available_kb, 4_000_000);
        assert!((info.used_percent() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_meminfo_missing_available() {
        let err = MemInfo::parse("MemTotal: 100 kB\nMemFree: 50 kB\n").unwrap_err();
        assert!(err.to_string().contains("MemAvailable"));
    }

    #[test]
    fn test_zero_total() {
        let info = MemInfo {
            total_kb: 0,
            available_kb: 0,
        };
        assert_eq!(info.used_percent(), 0.0);
    }

    #[test]
    fn test_poll_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meminfo");
        std::fs::write(&path, MEMINFO).unwrap();
        let sampler = MemorySampler::with_path(&path);
        assert!((sampler.poll().unwrap() - 75.0).abs() < 1e-9);
    }
}
