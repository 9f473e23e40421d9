//! The workload executor seam.
//!
//! An executor runs the catalog for one category strictly sequentially,
//! streams lifecycle events while it does, and resolves to exactly one
//! terminal summary string (see [`crate::types::TerminalSummary`]).

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{BenchmarkEvent, Category, Preset};

/// Sender half handed to the executor for lifecycle events.
pub type EventSender = mpsc::UnboundedSender<BenchmarkEvent>;

/// Failures that prevent an executor from producing a terminal summary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("category {0} is not supported by this executor")]
    Unsupported(Category),

    #[error("workload executor failed: {0}")]
    Failed(String),
}

/// Runs the actual test bodies.
///
/// The returned future owns everything it needs; the caller spawns it and
/// may abort it at any point to cancel the run. Dropping `events` (which
/// happens when the future completes) ends the event stream.
pub trait WorkloadExecutor: Send + Sync + 'static {
    fn run(
        &self,
        preset: Preset,
        category: Category,
        events: EventSender,
    ) -> impl Future<Output = Result<String, ExecutorError>> + Send + 'static;
}
