//! Folds executor lifecycle events into the shared run state.

use finbench_common::{BenchmarkEvent, EventMode, EventState};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::events::{self, EventBus};
use crate::state::{
    LegacyProgress, RunState, RunStateCell, RunStatus, STARTING_BENCHMARKS_MESSAGE, TestStatus,
    WARMING_UP_MESSAGE,
};

/// What a single event did to the state.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Unknown test, duplicate, out-of-order or stale event.
    Ignored,
    WarmupStarted,
    WarmupFinished,
    TestStarted {
        name: String,
        extended_by: Option<u64>,
    },
    TestCompleted {
        name: String,
        progress: LegacyProgress,
    },
}

impl Applied {
    pub fn changed(&self) -> bool {
        !matches!(self, Applied::Ignored)
    }
}

/// Apply one event to `state`.
///
/// Events for unknown names, events that would move a test backwards and
/// events arriving while no run is active leave the state untouched.
pub fn apply(state: &mut RunState, event: &BenchmarkEvent) -> Applied {
    if !state.is_running() {
        return Applied::Ignored;
    }

    if event.mode == EventMode::Test {
        return match event.state {
            EventState::Started => {
                state.status_message = Some(WARMING_UP_MESSAGE.to_string());
                Applied::WarmupStarted
            }
            EventState::Completed => {
                state.status_message = Some(STARTING_BENCHMARKS_MESSAGE.to_string());
                Applied::WarmupFinished
            }
        };
    }

    match event.state {
        EventState::Started => apply_started(state, event),
        EventState::Completed => apply_completed(state, event),
    }
}

fn apply_started(state: &mut RunState, event: &BenchmarkEvent) -> Applied {
    let Some(status) = state
        .tests
        .iter()
        .find(|t| t.name == event.test_name)
        .map(|t| t.status)
    else {
        return Applied::Ignored;
    };
    if status != TestStatus::Pending {
        return Applied::Ignored;
    }
    if let Some(running) = state.running_test() {
        warn!(
            test = %event.test_name,
            running = %running.name,
            "STARTED while another test is running, ignoring"
        );
        return Applied::Ignored;
    }

    state.status = RunStatus::Running { warming_up: false };
    state.status_message = None;
    if let Some(test) = state.test_mut(&event.test_name) {
        test.status = TestStatus::Running;
        if let Some(mode) = &event.acceleration_mode {
            test.acceleration_mode = Some(mode.clone());
        }
    }
    state.current_test = Some(event.test_name.clone());

    let pending = state.pending_count();
    let extended_by = state.countdown.maybe_extend(pending);
    state.refresh_remaining();

    Applied::TestStarted {
        name: event.test_name.clone(),
        extended_by,
    }
}

fn apply_completed(state: &mut RunState, event: &BenchmarkEvent) -> Applied {
    let Some(test) = state.test_mut(&event.test_name) else {
        return Applied::Ignored;
    };
    if test.status == TestStatus::Completed {
        return Applied::Ignored;
    }

    test.status = TestStatus::Completed;
    test.duration_ms = Some(event.time_ms);
    test.elapsed_text = Some(format!("{:.2} s", event.time_ms as f64 / 1000.0));
    if let Some(mode) = &event.acceleration_mode {
        test.acceleration_mode = Some(mode.clone());
    }

    state.recompute_progress();
    state.refresh_remaining();

    Applied::TestCompleted {
        name: event.test_name.clone(),
        progress: state.legacy_progress(),
    }
}

/// Long-lived task consuming the executor's event stream.
pub struct EventCollector {
    cell: RunStateCell,
    bus: EventBus,
}

impl EventCollector {
    pub fn new(cell: RunStateCell, bus: EventBus) -> Self {
        Self { cell, bus }
    }

    /// Apply one event atomically and fan out the side effects.
    pub fn handle(&self, event: &BenchmarkEvent) -> Applied {
        let mut applied = Applied::Ignored;
        self.cell.update_if(|state| {
            applied = apply(state, event);
            applied.changed()
        });

        match &applied {
            Applied::Ignored => {
                debug!(test = %event.test_name, state = ?event.state, "Event ignored");
            }
            Applied::WarmupStarted | Applied::WarmupFinished => {
                debug!(state = ?event.state, "Warm-up event");
            }
            Applied::TestStarted { name, extended_by } => {
                info!(test = %name, mode = ?event.mode, "Test started");
                if let Some(secs) = extended_by {
                    debug!(test = %name, added_secs = secs, "Countdown re-extended");
                }
                self.bus.emit(
                    events::TEST_STARTED,
                    &json!({ "test": name, "mode": event.mode }),
                );
            }
            Applied::TestCompleted { name, progress } => {
                info!(
                    test = %name,
                    time_ms = event.time_ms,
                    completed = progress.completed_count,
                    total = progress.total_count,
                    "Test completed"
                );
                self.bus.emit(
                    events::TEST_COMPLETED,
                    &json!({ "test": name, "timeMs": event.time_ms }),
                );
                self.bus.emit(events::PROGRESS, progress);
                self.cell.publish_legacy(progress.clone());
            }
        }
        applied
    }

    /// Consume events until every sender is gone.
    ///
    /// Once `stop` turns true nothing more is applied: the stream is closed
    /// so the executor's next send fails, and the task keeps draining until
    /// the executor has dropped its senders. The task therefore ends only
    /// after the workload has let go of the device.
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<BenchmarkEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle(&event);
                    }
                    None => {
                        debug!("Event stream closed");
                        return;
                    }
                },
                _ = stop_requested(&mut stop) => break,
            }
        }

        events.close();
        let mut discarded = 0usize;
        while events.recv().await.is_some() {
            discarded += 1;
        }
        debug!(discarded, "Event stream released after stop");
    }
}

/// Resolves when `stop` turns true. A dropped sender never stops the
/// collector; the stream ending does.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countdown::Countdown;
    use finbench_common::{Category, Preset, TestCategory, TestDescriptor, catalog};
    use tokio::time::Instant;
    use uuid::Uuid;

    fn state_with(tests: &[TestDescriptor], countdown: Countdown) -> RunState {
        RunState::start(
            Uuid::new_v4(),
            Preset::Flagship,
            Category::Cpu,
            tests,
            countdown,
            Instant::now(),
        )
    }

    fn cpu_state() -> RunState {
        state_with(&catalog(Category::Cpu), Countdown::new(200, 10, 5))
    }

    fn started(name: &str) -> BenchmarkEvent {
        BenchmarkEvent::started(name, EventMode::Single)
    }

    fn completed(name: &str, ms: u64) -> BenchmarkEvent {
        BenchmarkEvent::completed(name, EventMode::Single, ms)
    }

    #[tokio::test]
    async fn test_started_then_completed() {
        let mut state = cpu_state();
        let name = "Single-Core Prime Generation";

        let applied = apply(&mut state, &started(name).with_acceleration_mode("cpu"));
        assert!(matches!(applied, Applied::TestStarted { extended_by: None, .. }));
        assert!(!state.is_warming_up());
        assert_eq!(state.current_test.as_deref(), Some(name));
        assert_eq!(state.tests[0].status, TestStatus::Running);
        assert_eq!(state.tests[0].acceleration_mode.as_deref(), Some("cpu"));

        let applied = apply(&mut state, &completed(name, 1234));
        let Applied::TestCompleted { progress, .. } = applied else {
            panic!("expected completion, got {applied:?}");
        };
        assert_eq!(state.tests[0].status, TestStatus::Completed);
        assert_eq!(state.tests[0].elapsed_text.as_deref(), Some("1.23 s"));
        assert_eq!(state.tests[0].duration_ms, Some(1234));
        assert_eq!(state.progress, 1.0 / 20.0);
        assert_eq!(progress.completed_count, 1);
        assert_eq!(progress.total_count, 20);
        assert_eq!(progress.current_benchmark, name);
    }

    #[tokio::test]
    async fn test_warmup_events_never_touch_tests() {
        let mut state = cpu_state();
        let warm = BenchmarkEvent::started("Warm-up", EventMode::Test);
        assert_eq!(apply(&mut state, &warm), Applied::WarmupStarted);
        assert_eq!(state.status_message.as_deref(), Some(WARMING_UP_MESSAGE));

        let done = BenchmarkEvent::completed("Warm-up", EventMode::Test, 900);
        assert_eq!(apply(&mut state, &done), Applied::WarmupFinished);
        assert_eq!(
            state.status_message.as_deref(),
            Some(STARTING_BENCHMARKS_MESSAGE)
        );
        assert_eq!(state.pending_count(), 20);
        assert_eq!(state.progress, 0.0);
        assert!(state.is_warming_up());
    }

    #[tokio::test]
    async fn test_unknown_name_is_noop() {
        let mut state = cpu_state();
        let before = state.clone();
        assert_eq!(apply(&mut state, &started("Quantum Annealing")), Applied::Ignored);
        assert_eq!(apply(&mut state, &completed("Quantum Annealing", 5)), Applied::Ignored);
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_status_never_regresses() {
        let mut state = cpu_state();
        let name = "Single-Core N-Queens";
        apply(&mut state, &started(name));
        apply(&mut state, &completed(name, 10));

        assert_eq!(apply(&mut state, &started(name)), Applied::Ignored);
        assert_eq!(apply(&mut state, &completed(name, 99)), Applied::Ignored);
        let test = state.tests.iter().find(|t| t.name == name).unwrap();
        assert_eq!(test.status, TestStatus::Completed);
        assert_eq!(test.duration_ms, Some(10));
        assert_eq!(state.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_single_running_test() {
        let mut state = cpu_state();
        apply(&mut state, &started("Single-Core Prime Generation"));
        assert_eq!(
            apply(&mut state, &started("Single-Core Fibonacci Recursive")),
            Applied::Ignored
        );
        assert_eq!(
            state
                .tests
                .iter()
                .filter(|t| t.status == TestStatus::Running)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_completed_without_started_is_accepted() {
        let mut state = cpu_state();
        let applied = apply(&mut state, &completed("Multi-Core Ray Tracing", 50));
        assert!(matches!(applied, Applied::TestCompleted { .. }));
        assert_eq!(state.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_countdown_extension_on_started() {
        let tests: Vec<_> = (0..4)
            .map(|i| TestDescriptor::new(format!("Single-Core Test {i}"), TestCategory::SingleCore))
            .collect();
        let mut state = state_with(&tests, Countdown::new(4, 10, 5));

        let applied = apply(&mut state, &started("Single-Core Test 0"));
        // Three tests are still pending after marking the first one RUNNING.
        assert_eq!(
            applied,
            Applied::TestStarted {
                name: "Single-Core Test 0".to_string(),
                extended_by: Some(30),
            }
        );
        assert_eq!(state.countdown.remaining_secs(), 34);
        assert_eq!(state.estimated_time_remaining, "00:34");
    }

    #[tokio::test]
    async fn test_events_after_run_end_are_ignored() {
        let mut state = cpu_state();
        state.finish(RunStatus::Completed);
        assert_eq!(
            apply(&mut state, &started("Single-Core Prime Generation")),
            Applied::Ignored
        );
    }

    #[tokio::test]
    async fn test_collector_publishes_legacy_progress() {
        let cell = RunStateCell::new(cpu_state());
        let bus = EventBus::default();
        let mut bus_rx = bus.subscribe();
        let legacy_rx = cell.subscribe_legacy();
        let collector = EventCollector::new(cell.clone(), bus);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(started("Single-Core Hash Computing")).unwrap();
        tx.send(completed("Single-Core Hash Computing", 2000)).unwrap();
        drop(tx);
        let (_stop_tx, stop_rx) = watch::channel(false);
        collector.run(rx, stop_rx).await;

        let legacy = legacy_rx.borrow().clone().expect("legacy progress published");
        assert_eq!(legacy.completed_count, 1);
        assert_eq!(legacy.progress_percent, 5);

        let mut names = Vec::new();
        while let Ok(msg) = bus_rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
            names.push(value["event"].as_str().unwrap().to_string());
        }
        assert_eq!(names, vec!["test:started", "test:completed", "progress"]);
        assert_eq!(cell.snapshot().completed_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_discards_events_until_senders_drop() {
        let cell = RunStateCell::new(cpu_state());
        let collector = EventCollector::new(cell.clone(), EventBus::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(collector.run(rx, stop_rx));

        let mut states = cell.subscribe();
        tx.send(started("Single-Core Prime Generation")).unwrap();
        states
            .wait_for(|s| s.running_test().is_some())
            .await
            .unwrap();

        stop_tx.send(true).unwrap();
        tx.closed().await;
        // Closed for the executor, but the task waits for it to let go.
        assert!(tx.send(completed("Single-Core Prime Generation", 10)).is_err());
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        drop(tx);
        task.await.unwrap();
        assert_eq!(cell.snapshot().completed_count(), 0);
    }
}
