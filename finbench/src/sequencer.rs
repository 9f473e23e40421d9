//! Run orchestration.
//!
//! [`TestSequencer::run`] drives one benchmark run end to end:
//!
//! 1. take the single-flight guard (a second caller gets
//!    [`RunOutcome::AlreadyRunning`] and the state is left alone)
//! 2. reset the run state with every catalog test PENDING and start the
//!    sampler tick
//! 3. sleep through the warm-up delay
//! 4. spawn the workload executor and the event collector side by side and
//!    wait for the executor's terminal summary
//! 5. let the collector drain, score the summary, mark the run finished and
//!    hand the result to the aggregator
//!
//! Any failure after step 1 lands in [`RunStatus::Failed`] with the error
//! text, emits `run:failed` and returns a [`RunError`] carrying an all-zero
//! fallback summary. Nothing is published or persisted for a failed run.
//!
//! The guard outlives the visible run. A finished, failed or cancelled run
//! keeps it until the executor has dropped every event sender it was given,
//! so a workload still running on a blocking thread can never overlap the
//! next run.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use finbench_common::{
    BenchConfig, BenchmarkResult, Category, ExecutorError, Preset, SummaryError,
    TerminalSummary, WorkloadExecutor, catalog,
};
use finbench_telemetry::{ScoreSummary, SystemSamplers};
use serde_json::json;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::aggregator::ResultAggregator;
use crate::collector::EventCollector;
use crate::countdown::Countdown;
use crate::events::{self, EventBus};
use crate::publisher::CompletionPublisher;
use crate::sampler::SamplerTask;
use crate::state::{RunState, RunStateCell, RunStatus, TestStatus};
use crate::store::ResultStore;

/// Why a run produced no usable terminal summary.
#[derive(Debug, Error)]
pub enum RunFault {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("workload executor task ended abnormally: {0}")]
    ExecutorTask(String),

    #[error(transparent)]
    SummaryParse(#[from] SummaryError),

    #[error("no terminal summary within {0}s")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("benchmark run failed: {fault}")]
    Failed {
        #[source]
        fault: RunFault,
        /// Zero scores over the tests that had completed.
        fallback: Box<ScoreSummary>,
    },

    #[error("benchmark run cancelled")]
    Cancelled,
}

impl RunError {
    pub fn fallback(&self) -> Option<&ScoreSummary> {
        match self {
            RunError::Failed { fallback, .. } => Some(fallback),
            RunError::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(ScoreSummary),
    /// Another run held the guard. Nothing was changed.
    AlreadyRunning,
}

enum Halt {
    Cancelled,
    Fault(RunFault),
}

impl From<RunFault> for Halt {
    fn from(fault: RunFault) -> Self {
        Halt::Fault(fault)
    }
}

/// Resolves once the run's event collector has ended, which happens only
/// after every event sender handed to the executor is gone.
#[derive(Clone)]
struct WorkloadExit(watch::Receiver<()>);

impl WorkloadExit {
    fn has_exited(&self) -> bool {
        self.0.has_changed().is_err()
    }

    async fn wait(mut self) {
        while self.0.changed().await.is_ok() {}
    }
}

/// Tasks and cancel signal of the run holding the guard.
struct ActiveRun {
    run_id: Uuid,
    preset: Preset,
    category: Category,
    cancel: watch::Sender<bool>,
    tasks: Vec<AbortHandle>,
}

impl ActiveRun {
    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

pub struct TestSequencer<E> {
    executor: E,
    config: BenchConfig,
    cell: RunStateCell,
    bus: EventBus,
    aggregator: ResultAggregator,
    samplers: Arc<SystemSamplers>,
    /// Single-flight guard. True from the start of `run` until its workload
    /// has exited.
    guard: Arc<watch::Sender<bool>>,
    active: Mutex<Option<ActiveRun>>,
    persisting: Mutex<Option<JoinHandle<()>>>,
}

impl<E: WorkloadExecutor> TestSequencer<E> {
    pub fn new(executor: E, config: BenchConfig) -> Self {
        let countdown = Countdown::from_config(
            &config.countdown,
            config.run.category,
            Preset::parse(&config.run.preset),
        );
        let bus = EventBus::default();
        Self {
            executor,
            cell: RunStateCell::new(RunState::idle(countdown)),
            aggregator: ResultAggregator::new(CompletionPublisher::new(), bus.clone()),
            bus,
            samplers: Arc::new(SystemSamplers::linux()),
            guard: Arc::new(watch::Sender::new(false)),
            active: Mutex::new(None),
            persisting: Mutex::new(None),
            config,
        }
    }

    pub fn with_samplers(mut self, samplers: SystemSamplers) -> Self {
        self.samplers = Arc::new(samplers);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.aggregator = self.aggregator.with_store(store);
        self
    }

    pub fn with_device_model(mut self, device_model: impl Into<String>) -> Self {
        self.aggregator = self.aggregator.with_device_model(device_model);
        self
    }

    pub fn state(&self) -> &RunStateCell {
        &self.cell
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn completions(&self) -> &CompletionPublisher {
        self.aggregator.publisher()
    }

    pub fn is_running(&self) -> bool {
        *self.guard.borrow()
    }

    /// Wait until no run holds the guard.
    pub async fn wait_idle(&self) {
        let mut guard = self.guard.subscribe();
        let _ = guard.wait_for(|held| !*held).await;
    }

    fn try_acquire(&self) -> bool {
        self.guard.send_if_modified(|held| {
            if *held {
                return false;
            }
            *held = true;
            true
        })
    }

    fn release(&self) {
        self.guard.send_replace(false);
    }

    /// Release the guard once `exit` fires, without waiting here.
    fn release_after(&self, exit: WorkloadExit) {
        if exit.has_exited() {
            self.release();
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            self.release();
            return;
        };
        let guard = Arc::clone(&self.guard);
        runtime.spawn(async move {
            exit.wait().await;
            guard.send_replace(false);
            debug!("Workload of abandoned run exited, guard released");
        });
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the catalog for `category` once.
    pub async fn run(&self, preset: &str, category: Category) -> Result<RunOutcome, RunError> {
        if !self.try_acquire() {
            debug!("Run already in progress, ignoring start request");
            return Ok(RunOutcome::AlreadyRunning);
        }

        let preset = Preset::parse(preset);
        let run_id = Uuid::new_v4();
        let tests = catalog(category);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (exit_tx, exit_rx) = watch::channel(());
        let exit = WorkloadExit(exit_rx);
        *self.lock_active() = Some(ActiveRun {
            run_id,
            preset,
            category,
            cancel: cancel_tx,
            tasks: Vec::new(),
        });
        let mut abandon = AbandonOnDrop {
            sequencer: self,
            run_id,
            exit: exit.clone(),
            armed: true,
        };

        let countdown = Countdown::from_config(&self.config.countdown, category, preset);
        self.cell.reset(RunState::start(
            run_id,
            preset,
            category,
            &tests,
            countdown,
            Instant::now(),
        ));
        info!(%run_id, %preset, %category, tests = tests.len(), "Benchmark run started");
        self.bus.emit(
            events::RUN_STARTED,
            &json!({
                "runId": run_id,
                "preset": preset,
                "category": category,
                "totalTests": tests.len(),
            }),
        );

        let sampler = SamplerTask::new(
            self.cell.clone(),
            Arc::clone(&self.samplers),
            Duration::from_millis(self.config.run.sampler_interval_ms),
        )
        .spawn();
        self.track(run_id, sampler.abort_handle());

        let outcome = self
            .drive(run_id, preset, category, cancel_rx, exit_tx, exit.clone())
            .await;
        let result = match outcome {
            Ok(summary) => self.complete(run_id, category, summary),
            Err(Halt::Cancelled) => Err(RunError::Cancelled),
            Err(Halt::Fault(fault)) => self.fail(run_id, fault),
        };

        if !exit.has_exited() {
            debug!(%run_id, "Waiting for the workload to exit");
        }
        exit.wait().await;
        self.release();
        abandon.armed = false;
        result
    }

    async fn drive(
        &self,
        run_id: Uuid,
        preset: Preset,
        category: Category,
        mut cancel: watch::Receiver<bool>,
        exit_tx: watch::Sender<()>,
        exit: WorkloadExit,
    ) -> Result<ScoreSummary, Halt> {
        let warmup = Duration::from_millis(self.config.run.warmup_delay_ms);
        debug!(%run_id, warmup_ms = self.config.run.warmup_delay_ms, "Warming up");
        tokio::select! {
            _ = sleep(warmup) => {}
            _ = cancelled(&mut cancel) => return Err(Halt::Cancelled),
        }

        if *cancel.borrow() {
            return Err(Halt::Cancelled);
        }

        // The collector is never aborted: its end marks the workload's exit.
        let (tx, rx) = mpsc::unbounded_channel();
        let collector = EventCollector::new(self.cell.clone(), self.bus.clone());
        let stop = cancel.clone();
        tokio::spawn(async move {
            let _exit = exit_tx;
            collector.run(rx, stop).await;
        });
        let mut executor = tokio::spawn(self.executor.run(preset, category, tx));
        self.track(run_id, executor.abort_handle());

        let raw = tokio::select! {
            raw = self.await_summary(&mut executor) => raw,
            _ = cancelled(&mut cancel) => return Err(Halt::Cancelled),
        };
        self.drain(exit).await;

        let raw = raw?;
        let summary = TerminalSummary::parse(&raw).map_err(RunFault::from)?;
        debug!(
            %run_id,
            results = summary.detailed_results.len(),
            reported_final = summary.final_score,
            "Terminal summary received"
        );
        Ok(ScoreSummary::compute(summary.detailed_results))
    }

    async fn await_summary(
        &self,
        executor: &mut JoinHandle<Result<String, ExecutorError>>,
    ) -> Result<String, RunFault> {
        let joined = match self.config.run.summary_timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), &mut *executor).await {
                Ok(joined) => joined,
                Err(_) => {
                    executor.abort();
                    return Err(RunFault::Timeout(secs));
                }
            },
            None => (&mut *executor).await,
        };

        match joined {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(RunFault::ExecutorTask(e.to_string())),
        }
    }

    /// Give the collector a moment to fold what is still queued. A workload
    /// that outlived its executor task keeps sending; settling the run stops
    /// the collector and the guard waits for the workload instead.
    async fn drain(&self, exit: WorkloadExit) {
        let grace = Duration::from_millis(self.config.run.collector_drain_ms);
        if timeout(grace, exit.wait()).await.is_err() {
            debug!("Workload still sending events after drain period");
        }
    }

    fn track(&self, run_id: Uuid, task: AbortHandle) {
        match self.lock_active().as_mut() {
            Some(active) if active.run_id == run_id => active.tasks.push(task),
            _ => task.abort(),
        }
    }

    /// Take the active run if it is still `run_id`, stop its tasks and apply
    /// the final state change. Returns false when the run was cancelled.
    fn settle(&self, run_id: Uuid, finalize: impl FnOnce(&mut RunState)) -> bool {
        let mut active = self.lock_active();
        let Some(mut run) = active.take_if(|run| run.run_id == run_id) else {
            return false;
        };
        let _ = run.cancel.send(true);
        run.abort_tasks();
        self.cell.update(finalize);
        true
    }

    fn complete(
        &self,
        run_id: Uuid,
        category: Category,
        summary: ScoreSummary,
    ) -> Result<RunOutcome, RunError> {
        let mut metrics = None;
        let settled = self.settle(run_id, |state| {
            for result in &summary.individual_scores {
                if let Some(test) = state.test_mut(&result.name) {
                    test.result = Some(result.clone());
                }
            }
            state.finish(RunStatus::Completed);
            metrics = Some(state.metrics.to_json());
        });
        if !settled {
            return Err(RunError::Cancelled);
        }

        info!(
            %run_id,
            final_score = format!("{:.2}", summary.final_weighted_score),
            rating = summary.rating().label(),
            "Benchmark run completed"
        );
        let metrics = metrics.unwrap_or_default();
        let (_, persist) = self.aggregator.finish(run_id, category, &summary, metrics);
        *self
            .persisting
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = persist;
        Ok(RunOutcome::Completed(summary))
    }

    fn fail(&self, run_id: Uuid, fault: RunFault) -> Result<RunOutcome, RunError> {
        let message = fault.to_string();
        let mut tracked = Vec::new();
        let settled = self.settle(run_id, |state| {
            tracked = state
                .tests
                .iter()
                .filter(|t| t.status == TestStatus::Completed)
                .map(|t| {
                    t.result.clone().unwrap_or_else(|| {
                        BenchmarkResult::invalid(&t.name, t.duration_ms.unwrap_or(0) as f64)
                    })
                })
                .collect();
            state.finish(RunStatus::Failed {
                error: message.clone(),
            });
        });
        if !settled {
            return Err(RunError::Cancelled);
        }

        error!(%run_id, error = %message, completed = tracked.len(), "Benchmark run failed");
        self.bus.emit(
            events::RUN_FAILED,
            &json!({ "runId": run_id, "error": message }),
        );
        Err(RunError::Failed {
            fault,
            fallback: Box::new(ScoreSummary::fallback(tracked)),
        })
    }

    /// Wait for the last completed run to reach the result store.
    pub async fn wait_for_persistence(&self) {
        let pending = self
            .persisting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = pending
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Result persistence task failed");
        }
    }

    /// Abort the active run and return the state to idle.
    ///
    /// The guard stays held until the cancelled workload has exited; see
    /// [`TestSequencer::wait_idle`]. Returns false when nothing was running.
    pub fn cancel(&self) -> bool {
        self.cancel_run(None)
    }

    fn cancel_run(&self, only: Option<Uuid>) -> bool {
        let mut active = self.lock_active();
        let Some(mut run) = active.take_if(|run| only.is_none_or(|id| id == run.run_id)) else {
            return false;
        };
        let _ = run.cancel.send(true);
        run.abort_tasks();
        self.cell.reset(RunState::idle(Countdown::from_config(
            &self.config.countdown,
            run.category,
            run.preset,
        )));
        drop(active);

        warn!(run_id = %run.run_id, "Benchmark run cancelled");
        self.bus
            .emit(events::RUN_CANCELLED, &json!({ "runId": run.run_id }));
        true
    }
}

/// Cancels the run if the `run` future is dropped before it releases the
/// guard, and hands the release over to a task waiting on the workload.
struct AbandonOnDrop<'a, E: WorkloadExecutor> {
    sequencer: &'a TestSequencer<E>,
    run_id: Uuid,
    exit: WorkloadExit,
    armed: bool,
}

impl<E: WorkloadExecutor> Drop for AbandonOnDrop<'_, E> {
    fn drop(&mut self) {
        if self.armed {
            self.sequencer.cancel_run(Some(self.run_id));
            self.sequencer.release_after(self.exit.clone());
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
