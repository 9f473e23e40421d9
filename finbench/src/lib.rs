//! finbench - Benchmark Orchestration Core
//!
//! Drives the workload catalog through a [`WorkloadExecutor`], folds its
//! lifecycle events into a shared [`RunState`], keeps the countdown and
//! system stats ticking, scores the terminal summary and publishes the
//! completion envelope exactly once per run.
//!
//! [`WorkloadExecutor`]: finbench_common::WorkloadExecutor

#![forbid(unsafe_code)]

pub mod aggregator;
pub mod collector;
pub mod countdown;
pub mod events;
pub mod publisher;
pub mod sampler;
pub mod sequencer;
pub mod state;
pub mod store;

pub use aggregator::ResultAggregator;
pub use collector::{Applied, EventCollector};
pub use countdown::{Countdown, FINALIZING, format_mm_ss};
pub use events::EventBus;
pub use publisher::{CompletionEnvelope, CompletionPublisher, CompletionSubscription};
pub use sampler::SamplerTask;
pub use sequencer::{RunError, RunFault, RunOutcome, TestSequencer};
pub use state::{LegacyProgress, RunState, RunStateCell, RunStatus, TestState, TestStatus};
pub use store::{
    DetailEntity, JsonlResultStore, MasterEntity, ResultStore, SaveFuture, StoreError, StoredRun,
};
