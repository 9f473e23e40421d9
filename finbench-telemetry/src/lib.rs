//! finbench - Telemetry
//!
//! Score calculation for benchmark runs and the system samplers polled while
//! a run is in progress.

#![forbid(unsafe_code)]

pub mod collect;
pub mod score;

pub use collect::{
    CpuSampler, FnSampler, MemorySampler, MetricsAccumulator, PowerSampler, SampleError, Sampler,
    SystemSamplers, SystemStats, ThermalSampler,
};
pub use score::{DetailedScore, Rating, ScoreSummary};
