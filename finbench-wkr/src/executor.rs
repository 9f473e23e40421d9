//! Native CPU workload executor.
//!
//! Runs the CPU catalog strictly in order on the blocking pool, streaming
//! lifecycle events as each test starts and completes, and resolves to the
//! terminal JSON summary. A panicking test body becomes an invalid zero
//! result and the run continues.
//!
//! The blocking body owns the event sender. Aborting the async side leaves
//! the body running until its next send fails at a test boundary, and the
//! sender drops only when the body has returned.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use finbench_common::{
    BenchmarkEvent, BenchmarkResult, Category, EventMode, EventSender, ExecutorError, Preset,
    TerminalSummary, WorkloadExecutor, WorkloadKind, catalog,
};
use finbench_telemetry::ScoreSummary;
use tracing::{debug, info, warn};

use crate::params::WorkloadParams;
use crate::workloads::{self, available_threads};

/// Name carried by warm-up events.
pub const WARMUP_TEST_NAME: &str = "Warm-up";

/// Executor for the CPU category backed by the in-process workload bodies.
#[derive(Debug, Clone)]
pub struct NativeExecutor {
    scale: u32,
    threads: usize,
    warmup: bool,
}

impl Default for NativeExecutor {
    fn default() -> Self {
        Self {
            scale: 1,
            threads: available_threads(),
            warmup: true,
        }
    }
}

impl NativeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Divide workload sizes by `scale` (see [`WorkloadParams::scaled`]).
    #[must_use]
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale.max(1);
        self
    }

    /// Worker threads for multi-core tests.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Enable or disable the warm-up pass.
    #[must_use]
    pub fn with_warmup(mut self, warmup: bool) -> Self {
        self.warmup = warmup;
        self
    }
}

impl WorkloadExecutor for NativeExecutor {
    fn run(
        &self,
        preset: Preset,
        category: Category,
        events: EventSender,
    ) -> impl Future<Output = Result<String, ExecutorError>> + Send + 'static {
        let params = WorkloadParams::for_preset(preset).scaled(self.scale);
        let threads = self.threads;
        let warmup = self.warmup;

        async move {
            if category != Category::Cpu {
                return Err(ExecutorError::Unsupported(category));
            }
            info!(%preset, threads, "Starting native CPU workloads");
            tokio::task::spawn_blocking(move || run_catalog(&params, threads, warmup, &events))
                .await
                .map_err(|e| ExecutorError::Failed(format!("workload thread failed: {e}")))?
        }
    }
}

fn receiver_closed() -> ExecutorError {
    ExecutorError::Failed("event receiver closed".to_string())
}

fn emit(events: &EventSender, event: BenchmarkEvent) -> Result<(), ExecutorError> {
    events.send(event).map_err(|_| receiver_closed())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Short prime, Fibonacci and matrix pass to settle clocks before measuring.
fn run_warmup(threads: usize, events: &EventSender) -> Result<(), ExecutorError> {
    let params = WorkloadParams::for_preset(Preset::Slow).scaled(100);
    for kind in [
        WorkloadKind::PrimeGeneration,
        WorkloadKind::Fibonacci,
        WorkloadKind::MatrixMultiplication,
    ] {
        if events.is_closed() {
            return Err(receiver_closed());
        }
        let _ = panic::catch_unwind(|| workloads::measure(kind, &params, threads));
    }
    Ok(())
}

fn run_catalog(
    params: &WorkloadParams,
    threads: usize,
    warmup: bool,
    events: &EventSender,
) -> Result<String, ExecutorError> {
    if warmup {
        let start = Instant::now();
        emit(events, BenchmarkEvent::started(WARMUP_TEST_NAME, EventMode::Test))?;
        run_warmup(threads, events)?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        emit(
            events,
            BenchmarkEvent::completed(WARMUP_TEST_NAME, EventMode::Test, elapsed_ms),
        )?;
        debug!(elapsed_ms, "Warm-up finished");
    }

    let mut results = Vec::new();
    for descriptor in catalog(Category::Cpu) {
        let Some((kind, test_category)) = WorkloadKind::from_test_name(&descriptor.name) else {
            warn!(test = %descriptor.name, "No workload body for catalog entry");
            continue;
        };
        let mode = EventMode::from(test_category);

        emit(events, BenchmarkEvent::started(&descriptor.name, mode))?;
        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            workloads::run_test(kind, test_category, params, threads)
        }));
        let elapsed = start.elapsed();

        let result = outcome.unwrap_or_else(|payload| {
            warn!(
                test = %descriptor.name,
                reason = %panic_message(payload.as_ref()),
                "Workload panicked, recording invalid result"
            );
            BenchmarkResult::invalid(&descriptor.name, elapsed.as_secs_f64() * 1000.0)
        });

        emit(
            events,
            BenchmarkEvent::completed(&descriptor.name, mode, elapsed.as_millis() as u64),
        )?;
        results.push(result);
    }

    build_summary(results)
}

/// Score results and render the terminal summary JSON.
pub fn build_summary(results: Vec<BenchmarkResult>) -> Result<String, ExecutorError> {
    let summary = ScoreSummary::compute(results);
    let terminal = TerminalSummary {
        single_core_score: summary.single_core_score,
        multi_core_score: summary.multi_core_score,
        final_score: summary.final_weighted_score,
        normalized_score: summary.normalized_score,
        detailed_results: summary.individual_scores,
    };
    terminal
        .to_json()
        .map_err(|e| ExecutorError::Failed(format!("failed to encode summary: {e}")))
}

