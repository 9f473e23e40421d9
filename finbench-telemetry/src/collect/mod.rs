//! System metrics collection.
//!
//! Each sampler is a zero-argument poll returning one float. The Linux
//! implementations read /proc and /sys; any failure is logged and that
//! tick's value becomes `0.0`.

pub mod cpu;
pub mod memory;
pub mod power;
pub mod thermal;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{trace, warn};

pub use cpu::CpuSampler;
pub use memory::MemorySampler;
pub use power::PowerSampler;
pub use thermal::ThermalSampler;

/// Errors that can occur while polling a sampler.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {source_name}: {detail}")]
    Parse {
        source_name: &'static str,
        detail: String,
    },

    #[error("{0} is not available on this system")]
    Unavailable(&'static str),
}

impl SampleError {
    pub(crate) fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn parse(source_name: &'static str, detail: impl Into<String>) -> Self {
        Self::Parse {
            source_name,
            detail: detail.into(),
        }
    }
}

/// A single system metric poll.
pub trait Sampler: Send + Sync {
    fn name(&self) -> &'static str;
    fn poll(&self) -> Result<f64, SampleError>;
}

/// Sampler backed by a closure. Useful for fixed readings and tests.
pub struct FnSampler<F> {
    name: &'static str,
    poll: F,
}

impl<F> FnSampler<F>
where
    F: Fn() -> Result<f64, SampleError> + Send + Sync,
{
    pub fn new(name: &'static str, poll: F) -> Self {
        Self { name, poll }
    }
}

impl<F> Sampler for FnSampler<F>
where
    F: Fn() -> Result<f64, SampleError> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn poll(&self) -> Result<f64, SampleError> {
        (self.poll)()
    }
}

/// One tick's worth of system readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_percent: f64,
    pub power_mw: f64,
    pub temperature_c: f64,
    pub memory_percent: f64,
}

/// The four sampler collaborators polled once per tick.
pub struct SystemSamplers {
    cpu: Box<dyn Sampler>,
    power: Box<dyn Sampler>,
    temperature: Box<dyn Sampler>,
    memory: Box<dyn Sampler>,
}

impl SystemSamplers {
    pub fn new(
        cpu: Box<dyn Sampler>,
        power: Box<dyn Sampler>,
        temperature: Box<dyn Sampler>,
        memory: Box<dyn Sampler>,
    ) -> Self {
        Self {
            cpu,
            power,
            temperature,
            memory,
        }
    }

    /// Samplers reading the standard Linux /proc and /sys locations.
    pub fn linux() -> Self {
        Self::new(
            Box::new(CpuSampler::new()),
            Box::new(PowerSampler::new()),
            Box::new(ThermalSampler::new()),
            Box::new(MemorySampler::new()),
        )
    }

    /// Poll every sampler. Never fails.
    pub fn sample(&self) -> SystemStats {
        let stats = SystemStats {
            cpu_percent: poll_or_zero(self.cpu.as_ref()),
            power_mw: poll_or_zero(self.power.as_ref()),
            temperature_c: poll_or_zero(self.temperature.as_ref()),
            memory_percent: poll_or_zero(self.memory.as_ref()),
        };
        trace!(?stats, "System stats sampled");
        stats
    }
}

fn poll_or_zero(sampler: &dyn Sampler) -> f64 {
    match sampler.poll() {
        Ok(value) if value.is_finite() => value,
        Ok(value) => {
            warn!(sampler = sampler.name(), value, "Sampler returned non-finite value");
            0.0
        }
        Err(e) => {
            warn!(sampler = sampler.name(), error = %e, "Sampler failed");
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Series {
    sum: f64,
    peak: f64,
}

impl Series {
    fn record(&mut self, value: f64) {
        self.sum += value;
        if value > self.peak {
            self.peak = value;
        }
    }

    fn average(&self, samples: u64) -> f64 {
        if samples == 0 {
            0.0
        } else {
            self.sum / samples as f64
        }
    }
}

/// Running averages and peaks over the ticks of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsAccumulator {
    samples: u64,
    cpu: Series,
    power: Series,
    temperature: Series,
    memory: Series,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stats: &SystemStats) {
        self.samples += 1;
        self.cpu.record(stats.cpu_percent);
        self.power.record(stats.power_mw);
        self.temperature.record(stats.temperature_c);
        self.memory.record(stats.memory_percent);
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Performance-metrics blob for the completion envelope.
    pub fn to_json(&self) -> Map<String, Value> {
        let n = self.samples;
        let value = json!({
            "samples": n,
            "avg_cpu_percent": self.cpu.average(n),
            "peak_cpu_percent": self.cpu.peak,
            "avg_power_mw": self.power.average(n),
            "peak_power_mw": self.power.peak,
            "avg_temperature_c": self.temperature.average(n),
            "peak_temperature_c": self.temperature.peak,
            "avg_memory_percent": self.memory.average(n),
            "peak_memory_percent": self.memory.peak,
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}
