//! Sequencer runs against scripted executors.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use finbench::{
    JsonlResultStore, RunError, RunFault, RunOutcome, RunStatus, TestSequencer, TestStatus,
};
use finbench_common::{
    BenchConfig, BenchmarkEvent, Category, EventMode, EventSender, ExecutorError, Preset,
    TestCategory, WorkloadExecutor, catalog,
};
use finbench_telemetry::{FnSampler, SystemSamplers};
use finbench_wkr::NativeExecutor;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::time::sleep;
use tracing::{Level, info};
use tracing_subscriber::fmt;

fn init_test_logging() {
    let _ = fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
enum Ending {
    Summary,
    Raw(String),
    Fail(ExecutorError),
    Hang,
}

/// Walks the catalog, spending `per_test` on each test.
#[derive(Clone)]
struct Scripted {
    per_test: Duration,
    ending: Ending,
}

impl Scripted {
    fn new(per_test_ms: u64, ending: Ending) -> Self {
        Self {
            per_test: Duration::from_millis(per_test_ms),
            ending,
        }
    }
}

impl WorkloadExecutor for Scripted {
    fn run(
        &self,
        _preset: Preset,
        category: Category,
        events: EventSender,
    ) -> impl Future<Output = Result<String, ExecutorError>> + Send + 'static {
        let script = self.clone();
        async move {
            let _ = events.send(BenchmarkEvent::started("Warm-up", EventMode::Test));
            let _ = events.send(BenchmarkEvent::completed("Warm-up", EventMode::Test, 0));

            let mut results = Vec::new();
            for test in catalog(category) {
                let mode = EventMode::from(test.category);
                let _ = events.send(BenchmarkEvent::started(&test.name, mode));
                sleep(script.per_test).await;
                let _ = events.send(BenchmarkEvent::completed(
                    &test.name,
                    mode,
                    script.per_test.as_millis() as u64,
                ));
                let ops = match test.category {
                    TestCategory::SingleCore => 2_000.0,
                    TestCategory::MultiCore => 6_000.0,
                    TestCategory::Other => 10.0,
                };
                results.push(json!({
                    "name": test.name,
                    "executionTimeMs": script.per_test.as_millis() as f64,
                    "opsPerSecond": ops,
                    "isValid": true,
                    "metricsJson": "{}",
                }));
            }

            match script.ending {
                Ending::Summary => Ok(json!({
                    "single_core_score": 0.0,
                    "multi_core_score": 0.0,
                    "final_score": 0.0,
                    "normalized_score": 0.0,
                    "detailed_results": results,
                })
                .to_string()),
                Ending::Raw(raw) => Ok(raw),
                Ending::Fail(e) => Err(e),
                Ending::Hang => std::future::pending().await,
            }
        }
    }
}

fn samplers() -> SystemSamplers {
    SystemSamplers::new(
        Box::new(FnSampler::new("cpu", || Ok(60.0))),
        Box::new(FnSampler::new("power", || Ok(1800.0))),
        Box::new(FnSampler::new("temperature", || Ok(38.5))),
        Box::new(FnSampler::new("memory", || Ok(40.0))),
    )
}

fn sequencer(executor: Scripted, config: BenchConfig) -> Arc<TestSequencer<Scripted>> {
    Arc::new(TestSequencer::new(executor, config).with_samplers(samplers()))
}

fn bus_events(rx: &mut tokio::sync::broadcast::Receiver<String>) -> Vec<String> {
    let mut names = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        let value: Value = serde_json::from_str(&msg).unwrap();
        names.push(value["event"].as_str().unwrap().to_string());
    }
    names
}

#[tokio::test(start_paused = true)]
async fn test_progress_invariants_hold_at_every_snapshot() {
    init_test_logging();
    info!("TEST START: test_progress_invariants_hold_at_every_snapshot");

    let seq = sequencer(Scripted::new(300, Ending::Summary), BenchConfig::default());
    let mut states = seq.state().subscribe();
    let watcher = tokio::spawn(async move {
        let mut observed = 0usize;
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            let total = state.total_tests();
            let completed = state.completed_count();
            assert_eq!(completed, (state.progress * total as f64).round() as usize);
            assert!(
                state
                    .tests
                    .iter()
                    .filter(|t| t.status == TestStatus::Running)
                    .count()
                    <= 1
            );
            observed += 1;
            if matches!(state.status, RunStatus::Completed) {
                break;
            }
        }
        observed
    });

    let outcome = seq.run("mid", Category::Cpu).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    let observed = watcher.await.unwrap();
    assert!(observed >= 10, "only {observed} snapshots observed");

    info!("TEST PASS: test_progress_invariants_hold_at_every_snapshot");
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_ignored_while_running() {
    init_test_logging();
    info!("TEST START: test_second_start_is_ignored_while_running");

    let seq = sequencer(Scripted::new(200, Ending::Summary), BenchConfig::default());
    let first = {
        let seq = Arc::clone(&seq);
        tokio::spawn(async move { seq.run("flagship", Category::Cpu).await })
    };
    sleep(Duration::from_millis(2_500)).await;

    let before = seq.state().snapshot();
    assert!(before.is_running());
    let second = seq.run("slow", Category::Ai).await.unwrap();
    assert_eq!(second, RunOutcome::AlreadyRunning);

    let after = seq.state().snapshot();
    assert_eq!(after.run_id, before.run_id);
    assert_eq!(after.preset, Preset::Flagship);
    assert_eq!(after.category, Category::Cpu);

    assert!(matches!(
        first.await.unwrap().unwrap(),
        RunOutcome::Completed(_)
    ));
    info!("TEST PASS: test_second_start_is_ignored_while_running");
}

#[tokio::test(start_paused = true)]
async fn test_late_subscriber_receives_envelope() {
    init_test_logging();
    info!("TEST START: test_late_subscriber_receives_envelope");

    let seq = sequencer(Scripted::new(100, Ending::Summary), BenchConfig::default());
    seq.run("slow", Category::Cpu).await.unwrap();

    let mut late = seq.completions().subscribe();
    let envelope = late.latest().await.expect("envelope replayed");
    assert_eq!(envelope.kind, "CPU");
    assert_eq!(Some(envelope.run_id), seq.state().snapshot().run_id);
    assert_eq!(envelope.detailed_results.len(), 20);
    // 10 × 2000 ops/s and 10 × 6000 ops/s across the factor table.
    assert!(envelope.multi_core_score > envelope.single_core_score);
    assert!((envelope.multi_core_score - 3.0 * envelope.single_core_score).abs() < 1e-6);

    info!("TEST PASS: test_late_subscriber_receives_envelope");
}

#[tokio::test(start_paused = true)]
async fn test_executor_failure_surfaces_fallback() {
    init_test_logging();
    info!("TEST START: test_executor_failure_surfaces_fallback");

    let seq = sequencer(
        Scripted::new(100, Ending::Fail(ExecutorError::Failed("device lost".to_string()))),
        BenchConfig::default(),
    );
    let mut bus = seq.events().subscribe();
    let err = seq.run("mid", Category::Cpu).await.unwrap_err();

    let RunError::Failed { fault, fallback } = err else {
        panic!("expected a failed run");
    };
    assert!(matches!(fault, RunFault::Executor(_)));
    assert_eq!(fallback.individual_scores.len(), 20);
    assert_eq!(fallback.normalized_score, 0.0);

    let state = seq.state().snapshot();
    assert_eq!(state.error(), Some("workload executor failed: device lost"));
    assert!(!seq.is_running());
    assert!(seq.completions().latest().is_none());

    let names = bus_events(&mut bus);
    assert_eq!(names.first().map(String::as_str), Some("run:started"));
    assert_eq!(names.last().map(String::as_str), Some("run:failed"));
    assert!(!names.iter().any(|n| n == "run:completed"));

    // The guard is free again, so a second attempt actually runs.
    assert!(matches!(
        seq.run("mid", Category::Cpu).await,
        Err(RunError::Failed { .. })
    ));
    info!("TEST PASS: test_executor_failure_surfaces_fallback");
}

#[tokio::test(start_paused = true)]
async fn test_empty_summary_is_a_parse_fault() {
    init_test_logging();
    let seq = sequencer(
        Scripted::new(10, Ending::Raw(String::new())),
        BenchConfig::default(),
    );
    let err = seq.run("slow", Category::Ai).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::Failed {
            fault: RunFault::SummaryParse(_),
            ..
        }
    ));
    assert_eq!(err.fallback().unwrap().individual_scores.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_summary_timeout() {
    init_test_logging();
    info!("TEST START: test_summary_timeout");

    let mut config = BenchConfig::default();
    config.run.summary_timeout_secs = Some(30);
    let seq = sequencer(Scripted::new(100, Ending::Hang), config);

    let err = seq.run("mid", Category::Cpu).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::Failed {
            fault: RunFault::Timeout(30),
            ..
        }
    ));
    let state = seq.state().snapshot();
    assert!(!state.is_running());
    assert_eq!(state.completed_count(), 20);

    info!("TEST PASS: test_summary_timeout");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_resets_to_idle() {
    init_test_logging();
    info!("TEST START: test_cancel_resets_to_idle");

    let seq = sequencer(Scripted::new(1_000, Ending::Hang), BenchConfig::default());
    let mut bus = seq.events().subscribe();
    let runner = {
        let seq = Arc::clone(&seq);
        tokio::spawn(async move { seq.run("slow", Category::Cpu).await })
    };

    sleep(Duration::from_millis(5_500)).await;
    assert!(seq.state().snapshot().completed_count() >= 2);
    assert!(seq.cancel());
    assert!(!seq.cancel());

    let result = runner.await.unwrap();
    assert!(matches!(result, Err(RunError::Cancelled)));

    let state = seq.state().snapshot();
    assert_eq!(state.status, RunStatus::Idle);
    assert!(state.tests.is_empty());
    assert_eq!(state.estimated_time_remaining, "01:00");
    assert!(!seq.is_running());
    assert!(seq.completions().latest().is_none());
    assert_eq!(
        bus_events(&mut bus).last().map(String::as_str),
        Some("run:cancelled")
    );

    // Stale tasks from the cancelled run never touch the idle state.
    sleep(Duration::from_secs(10)).await;
    assert_eq!(seq.state().snapshot().status, RunStatus::Idle);

    info!("TEST PASS: test_cancel_resets_to_idle");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_warmup() {
    init_test_logging();
    let seq = sequencer(Scripted::new(100, Ending::Summary), BenchConfig::default());
    let runner = {
        let seq = Arc::clone(&seq);
        tokio::spawn(async move { seq.run("mid", Category::Cpu).await })
    };

    sleep(Duration::from_millis(500)).await;
    assert!(seq.state().snapshot().is_warming_up());
    seq.cancel();
    assert!(matches!(runner.await.unwrap(), Err(RunError::Cancelled)));

    let outcome = seq.run("mid", Category::Cpu).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_run_future_releases_guard() {
    init_test_logging();
    let seq = sequencer(Scripted::new(100, Ending::Hang), BenchConfig::default());

    let abandoned = tokio::time::timeout(Duration::from_secs(5), seq.run("mid", Category::Cpu)).await;
    assert!(abandoned.is_err());
    assert_eq!(seq.state().snapshot().status, RunStatus::Idle);

    tokio::time::timeout(Duration::from_secs(1), seq.wait_idle())
        .await
        .expect("guard released once the aborted executor is gone");
    assert!(!seq.is_running());
}

/// Runs each test body on the blocking pool the way the native executor
/// does, so aborting the async side leaves the body running.
#[derive(Clone)]
struct BlockingBodies {
    per_test: Duration,
    body_alive: Arc<AtomicBool>,
}

impl WorkloadExecutor for BlockingBodies {
    fn run(
        &self,
        _preset: Preset,
        category: Category,
        events: EventSender,
    ) -> impl Future<Output = Result<String, ExecutorError>> + Send + 'static {
        let script = self.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                script.body_alive.store(true, Ordering::SeqCst);
                let mut results = Vec::new();
                for test in catalog(category) {
                    let mode = EventMode::from(test.category);
                    if events.send(BenchmarkEvent::started(&test.name, mode)).is_err() {
                        break;
                    }
                    std::thread::sleep(script.per_test);
                    results.push(json!({
                        "name": test.name,
                        "executionTimeMs": script.per_test.as_millis() as f64,
                        "opsPerSecond": 1_000.0,
                        "isValid": true,
                        "metricsJson": "{}",
                    }));
                    let time_ms = script.per_test.as_millis() as u64;
                    if events.send(BenchmarkEvent::completed(&test.name, mode, time_ms)).is_err() {
                        break;
                    }
                }
                script.body_alive.store(false, Ordering::SeqCst);
                Ok(json!({
                    "single_core_score": 0.0,
                    "multi_core_score": 0.0,
                    "final_score": 0.0,
                    "normalized_score": 0.0,
                    "detailed_results": results,
                })
                .to_string())
            })
            .await
            .map_err(|e| ExecutorError::Failed(e.to_string()))?
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_blocking_workload_holds_guard_until_exit() {
    init_test_logging();
    info!("TEST START: test_cancelled_blocking_workload_holds_guard_until_exit");

    let body_alive = Arc::new(AtomicBool::new(false));
    let mut config = BenchConfig::default();
    config.run.warmup_delay_ms = 0;
    let seq = Arc::new(
        TestSequencer::new(
            BlockingBodies {
                per_test: Duration::from_millis(400),
                body_alive: Arc::clone(&body_alive),
            },
            config,
        )
        .with_samplers(samplers()),
    );

    let mut states = seq.state().subscribe();
    let runner = {
        let seq = Arc::clone(&seq);
        tokio::spawn(async move { seq.run("flagship", Category::Cpu).await })
    };
    states
        .wait_for(|s| s.running_test().is_some())
        .await
        .unwrap();

    assert!(seq.cancel());
    assert_eq!(seq.state().snapshot().status, RunStatus::Idle);
    // The body is mid-test on its blocking thread.
    assert!(body_alive.load(Ordering::SeqCst));
    assert!(seq.is_running());
    assert_eq!(
        seq.run("flagship", Category::Cpu).await.unwrap(),
        RunOutcome::AlreadyRunning
    );

    tokio::time::timeout(Duration::from_secs(5), seq.wait_idle())
        .await
        .expect("guard released after the body stopped");
    assert!(!body_alive.load(Ordering::SeqCst));
    assert!(matches!(runner.await.unwrap(), Err(RunError::Cancelled)));

    // The body stopped at the next test boundary and never resumed.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(seq.state().snapshot().status, RunStatus::Idle);

    info!("TEST PASS: test_cancelled_blocking_workload_holds_guard_until_exit");
}

#[tokio::test(start_paused = true)]
async fn test_completed_run_is_persisted() {
    init_test_logging();
    info!("TEST START: test_completed_run_is_persisted");

    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("results.jsonl");
    let seq = Arc::new(
        TestSequencer::new(Scripted::new(50, Ending::Summary), BenchConfig::default())
            .with_samplers(samplers())
            .with_store(Arc::new(JsonlResultStore::new(&path)))
            .with_device_model("ci-runner"),
    );

    seq.run("mid", Category::Cpu).await.unwrap();
    seq.wait_for_persistence().await;
    seq.run("mid", Category::Cpu).await.unwrap();
    seq.wait_for_persistence().await;

    let runs = JsonlResultStore::load(&path).unwrap();
    assert_eq!(runs.len(), 2);
    let run = &runs[1];
    assert_eq!(run.master.kind, "CPU");
    assert_eq!(run.master.device_model, "ci-runner");
    assert!(run.master.total_score > 0.0);
    assert_eq!(run.details.len(), 10);
    assert_eq!(run.details[0].kind, "Prime Generation");

    let metrics: Value = serde_json::from_str(&run.master.performance_metrics_json).unwrap();
    assert_eq!(metrics["peak_temperature_c"], 38.5);

    info!("TEST PASS: test_completed_run_is_persisted");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_native_executor_end_to_end() {
    init_test_logging();
    info!("TEST START: test_native_executor_end_to_end");

    let mut config = BenchConfig::default();
    config.run.warmup_delay_ms = 0;
    let executor = NativeExecutor::new()
        .with_scale(1000)
        .with_threads(2)
        .with_warmup(false);
    let seq = TestSequencer::new(executor, config).with_samplers(samplers());

    let RunOutcome::Completed(summary) = seq.run("slow", Category::Cpu).await.unwrap() else {
        panic!("expected a completed run");
    };
    assert_eq!(summary.individual_scores.len(), 20);
    assert!(summary.final_weighted_score.is_finite());

    let state = seq.state().snapshot();
    assert_eq!(state.completed_count(), 20);
    assert_eq!(state.progress, 1.0);

    info!("TEST PASS: test_native_executor_end_to_end");
}
