//! The shared run state and the cell every writer goes through.
//!
//! The sequencer, the event collector and the sampler all mutate one
//! [`RunState`] through [`RunStateCell`]. Each update is a single
//! read-modify-write under the cell's lock, so a sampler tick can never
//! overwrite a concurrent progress update. Readers either take snapshots or
//! subscribe for change notifications.

use std::sync::Arc;

use finbench_common::{BenchmarkResult, Category, Preset, TestCategory, TestDescriptor};
use finbench_telemetry::{MetricsAccumulator, SystemStats};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::countdown::Countdown;

pub const WARMING_UP_MESSAGE: &str = "Warming up...";
pub const STARTING_BENCHMARKS_MESSAGE: &str = "Starting benchmarks...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pending,
    Running,
    Completed,
}

/// Per-test lifecycle record. Status only moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestState {
    pub name: String,
    pub category: TestCategory,
    pub status: TestStatus,
    /// Duration formatted as `"%.2f s"` once completed.
    pub elapsed_text: Option<String>,
    pub duration_ms: Option<u64>,
    pub result: Option<BenchmarkResult>,
    pub acceleration_mode: Option<String>,
}

impl TestState {
    pub fn pending(descriptor: &TestDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            category: descriptor.category,
            status: TestStatus::Pending,
            elapsed_text: None,
            duration_ms: None,
            result: None,
            acceleration_mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RunStatus {
    #[default]
    Idle,
    Running {
        warming_up: bool,
    },
    Completed,
    Failed {
        error: String,
    },
}

/// Snapshot for observers that only understand flat progress counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyProgress {
    pub current_benchmark: String,
    pub progress_percent: u32,
    #[serde(rename = "completedBenchmarks")]
    pub completed_count: usize,
    #[serde(rename = "totalBenchmarks")]
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunState {
    pub run_id: Option<Uuid>,
    pub tests: Vec<TestState>,
    /// `completed / total`, recomputed on every completion.
    pub progress: f64,
    pub current_test: Option<String>,
    pub status: RunStatus,
    pub status_message: Option<String>,
    pub preset: Preset,
    pub category: Category,
    pub countdown: Countdown,
    pub estimated_time_remaining: String,
    pub elapsed_time: String,
    pub stats: SystemStats,
    pub metrics: MetricsAccumulator,
}

impl RunState {
    /// Idle state showing the configured budget.
    pub fn idle(countdown: Countdown) -> Self {
        let mut state = Self {
            countdown,
            ..Self::default()
        };
        state.refresh_remaining();
        state.elapsed_time = crate::countdown::format_mm_ss(0);
        state
    }

    /// Fresh running state with every test PENDING.
    pub fn start(
        run_id: Uuid,
        preset: Preset,
        category: Category,
        tests: &[TestDescriptor],
        mut countdown: Countdown,
        now: Instant,
    ) -> Self {
        countdown.start(now);
        let mut state = Self {
            run_id: Some(run_id),
            tests: tests.iter().map(TestState::pending).collect(),
            status: RunStatus::Running { warming_up: true },
            status_message: Some(WARMING_UP_MESSAGE.to_string()),
            preset,
            category,
            countdown,
            ..Self::default()
        };
        state.refresh_time_display(now);
        state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, RunStatus::Running { .. })
    }

    pub fn is_warming_up(&self) -> bool {
        matches!(self.status, RunStatus::Running { warming_up: true })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            RunStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn total_tests(&self) -> usize {
        self.tests.len()
    }

    fn count(&self, status: TestStatus) -> usize {
        self.tests.iter().filter(|t| t.status == status).count()
    }

    pub fn completed_count(&self) -> usize {
        self.count(TestStatus::Completed)
    }

    pub fn pending_count(&self) -> usize {
        self.count(TestStatus::Pending)
    }

    pub fn running_test(&self) -> Option<&TestState> {
        self.tests.iter().find(|t| t.status == TestStatus::Running)
    }

    pub fn test_mut(&mut self, name: &str) -> Option<&mut TestState> {
        self.tests.iter_mut().find(|t| t.name == name)
    }

    pub fn recompute_progress(&mut self) {
        self.progress = if self.tests.is_empty() {
            0.0
        } else {
            self.completed_count() as f64 / self.total_tests() as f64
        };
    }

    pub fn refresh_remaining(&mut self) {
        self.estimated_time_remaining = self
            .countdown
            .remaining_display(self.progress, self.is_running());
    }

    pub fn refresh_time_display(&mut self, now: Instant) {
        self.refresh_remaining();
        self.elapsed_time = self.countdown.elapsed_display(now);
    }

    /// Leave the running state. The tests and progress stay visible.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.current_test = None;
        self.status_message = None;
        self.refresh_remaining();
    }

    pub fn legacy_progress(&self) -> LegacyProgress {
        LegacyProgress {
            current_benchmark: self.current_test.clone().unwrap_or_default(),
            progress_percent: (self.progress * 100.0).round() as u32,
            completed_count: self.completed_count(),
            total_count: self.total_tests(),
        }
    }
}

/// Single shared owner of the run state.
#[derive(Clone)]
pub struct RunStateCell {
    state: Arc<watch::Sender<RunState>>,
    legacy: Arc<watch::Sender<Option<LegacyProgress>>>,
}

impl RunStateCell {
    pub fn new(initial: RunState) -> Self {
        Self {
            state: Arc::new(watch::Sender::new(initial)),
            legacy: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Atomic read-modify-write. Always notifies subscribers.
    pub fn update(&self, f: impl FnOnce(&mut RunState)) {
        self.state.send_modify(f);
    }

    /// Atomic read-modify-write that notifies only when `f` returns true.
    pub fn update_if(&self, f: impl FnOnce(&mut RunState) -> bool) -> bool {
        self.state.send_if_modified(f)
    }

    /// Replace the whole state.
    pub fn reset(&self, state: RunState) {
        self.state.send_replace(state);
    }

    pub fn snapshot(&self) -> RunState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn publish_legacy(&self, progress: LegacyProgress) {
        self.legacy.send_replace(Some(progress));
    }

    pub fn subscribe_legacy(&self) -> watch::Receiver<Option<LegacyProgress>> {
        self.legacy.subscribe()
    }
}

impl Default for RunStateCell {
    fn default() -> Self {
        Self::new(RunState::idle(Countdown::default()))
    }
}
