//! finbench - Native Workload Executor
//!
//! In-process CPU workload bodies and the executor that runs them in
//! catalog order for the orchestrator.

#![forbid(unsafe_code)]

pub mod executor;
pub mod params;
pub mod workloads;

pub use executor::{NativeExecutor, WARMUP_TEST_NAME, build_summary};
pub use params::WorkloadParams;
pub use workloads::{Measurement, available_threads, run_test};
