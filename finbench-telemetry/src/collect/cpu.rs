//! CPU utilization from /proc/stat.
//!
//! Utilization is the busy share of jiffies between two consecutive polls.
//! The first poll has no previous reading and reports the average since boot.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::{SampleError, Sampler};

const PROC_STAT: &str = "/proc/stat";

/// Aggregate CPU jiffies from the `cpu` line of /proc/stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    /// idle + iowait.
    pub idle: u64,
    pub total: u64,
}

impl CpuTimes {
    /// Parse the aggregate `cpu` line.
    ///
    /// Format:
    /// ```text
    /// cpu  user nice system idle iowait irq softirq steal guest guest_nice
    /// ```
    pub fn parse(content: &str) -> Result<Self, SampleError> {
        let line = content
            .lines()
            .find(|line| line.starts_with("cpu "))
            .ok_or_else(|| SampleError::parse("/proc/stat", "missing aggregate cpu line"))?;

        let values: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(|field| field.parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|e| SampleError::parse("/proc/stat", e.to_string()))?;

        if values.len() < 4 {
            return Err(SampleError::parse(
                "/proc/stat",
                format!("expected at least 4 fields, got {}", values.len()),
            ));
        }

        // guest and guest_nice are already counted in user and nice.
        let total = values.iter().take(8).sum();
        let idle = values[3] + values.get(4).copied().unwrap_or(0);
        Ok(Self { idle, total })
    }

    /// Busy percentage between `previous` and `self`.
    pub fn usage_since(&self, previous: Option<&CpuTimes>) -> f64 {
        let (idle, total) = match previous {
            Some(prev) => (
                self.idle.saturating_sub(prev.idle),
                self.total.saturating_sub(prev.total),
            ),
            None => (self.idle, self.total),
        };
        if total == 0 {
            return 0.0;
        }
        let busy = total.saturating_sub(idle);
        (busy as f64 / total as f64) * 100.0
    }
}

pub struct CpuSampler {
    path: PathBuf,
    previous: Mutex<Option<CpuTimes>>,
}

impl CpuSampler {
    pub fn new() -> Self {
        Self::with_path(PROC_STAT)
    }

    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            previous: Mutex::new(None),
        }
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for CpuSampler {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn poll(&self) -> Result<f64, SampleError> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| SampleError::read(&self.path, e))?;
        let current = CpuTimes::parse(&content)?;

        let mut previous = self.previous.lock().unwrap_or_else(|e| e.into_inner());
        let usage = current.usage_since(previous.as_ref());
        *previous = Some(current);

        debug!(usage = format!("{usage:.1}"), "CPU utilization sampled");
        Ok(usage)
    }
}
