//! Periodic system sampling and countdown tick.

use std::sync::Arc;
use std::time::Duration;

use finbench_telemetry::{SystemSamplers, SystemStats};
use tokio::task::{self, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace, warn};

use crate::state::RunStateCell;

/// Ticks once per `period` while a run is active. Each tick polls the
/// samplers, records the readings, decrements the countdown and refreshes
/// both time displays in one state update.
pub struct SamplerTask {
    cell: RunStateCell,
    samplers: Arc<SystemSamplers>,
    period: Duration,
}

impl SamplerTask {
    pub fn new(cell: RunStateCell, samplers: Arc<SystemSamplers>, period: Duration) -> Self {
        Self {
            cell,
            samplers,
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Spawn the tick loop. The caller aborts the handle when the run ends.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(period_ms = self.period.as_millis() as u64, "Sampler started");

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One sampling tick. The samplers read /proc and /sys, so they run on
    /// the blocking pool.
    pub async fn tick(&self) {
        let samplers = Arc::clone(&self.samplers);
        let stats = match task::spawn_blocking(move || samplers.sample()).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Sampler task failed: {}", e);
                SystemStats::default()
            }
        };
        let now = Instant::now();
        self.cell.update_if(|state| {
            if !state.is_running() {
                return false;
            }
            state.stats = stats;
            state.metrics.record(&stats);
            state.countdown.tick();
            state.refresh_time_display(now);
            trace!(
                remaining = %state.estimated_time_remaining,
                elapsed = %state.elapsed_time,
                "Tick"
            );
            true
        });
    }
}
