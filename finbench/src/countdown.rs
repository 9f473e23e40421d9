//! Remaining-time estimate and elapsed clock for a run.
//!
//! The estimate is a budget, not a measurement: it starts from a fixed
//! per-category/preset value, counts down once per sampler tick, and gets
//! topped up by `pending × per-test budget` when it runs low while tests are
//! still pending. It exists to keep the display from sitting at `00:00`
//! during long runs and should not be read as a precise ETA.

use finbench_common::{Category, CountdownConfig, Preset};
use tokio::time::Instant;
use tracing::debug;

/// Shown instead of `00:00` once the budget is spent and the run is
/// essentially done.
pub const FINALIZING: &str = "Finalizing...";

/// Format whole seconds as `MM:SS`.
pub fn format_mm_ss(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Countdown {
    remaining_secs: u64,
    per_test_budget_secs: u64,
    low_watermark_secs: u64,
    started_at: Option<Instant>,
}

impl Countdown {
    pub fn new(initial_secs: u64, per_test_budget_secs: u64, low_watermark_secs: u64) -> Self {
        Self {
            remaining_secs: initial_secs,
            per_test_budget_secs,
            low_watermark_secs,
            started_at: None,
        }
    }

    pub fn from_config(config: &CountdownConfig, category: Category, preset: Preset) -> Self {
        Self::new(
            config.initial_budget_secs(category, preset),
            config.per_test_budget_secs(preset),
            config.low_watermark_secs,
        )
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    /// One sampler tick. Floors at zero.
    pub fn tick(&mut self) {
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
    }

    /// Top up the budget when it is critically low and tests remain.
    ///
    /// Returns the number of seconds added, if any.
    pub fn maybe_extend(&mut self, pending: usize) -> Option<u64> {
        if self.remaining_secs >= self.low_watermark_secs || pending == 0 {
            return None;
        }
        let added = pending as u64 * self.per_test_budget_secs;
        self.remaining_secs += added;
        debug!(
            pending,
            added_secs = added,
            remaining_secs = self.remaining_secs,
            "Countdown extended"
        );
        Some(added)
    }

    pub fn elapsed_secs(&self, now: Instant) -> u64 {
        self.started_at
            .map(|start| now.saturating_duration_since(start).as_secs())
            .unwrap_or(0)
    }

    pub fn elapsed_display(&self, now: Instant) -> String {
        format_mm_ss(self.elapsed_secs(now))
    }

    /// Remaining-time text for the current run state.
    pub fn remaining_display(&self, progress: f64, running: bool) -> String {
        if !running && progress >= 1.0 {
            return format_mm_ss(0);
        }
        if self.remaining_secs == 0 && progress > 0.99 {
            return FINALIZING.to_string();
        }
        format_mm_ss(self.remaining_secs)
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::from_config(&CountdownConfig::default(), Category::Cpu, Preset::Unspecified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_mm_ss() {
        assert_eq!(format_mm_ss(0), "00:00");
        assert_eq!(format_mm_ss(59), "00:59");
        assert_eq!(format_mm_ss(200), "03:20");
        assert_eq!(format_mm_ss(6000), "100:00");
    }

    #[test]
    fn test_initial_budget_table() {
        let config = CountdownConfig::default();
        let budget = |category, preset| {
            Countdown::from_config(&config, category, preset).remaining_secs()
        };
        assert_eq!(budget(Category::Ai, Preset::Flagship), 100);
        assert_eq!(budget(Category::Ai, Preset::Slow), 100);
        assert_eq!(budget(Category::Cpu, Preset::Flagship), 200);
        assert_eq!(budget(Category::Cpu, Preset::Mid), 120);
        assert_eq!(budget(Category::Cpu, Preset::Slow), 60);
        assert_eq!(budget(Category::Cpu, Preset::Unspecified), 120);
    }

    #[test]
    fn test_tick_floors_at_zero() {
        let mut countdown = Countdown::new(2, 6, 5);
        countdown.tick();
        countdown.tick();
        countdown.tick();
        assert_eq!(countdown.remaining_secs(), 0);
        assert_eq!(countdown.remaining_display(0.5, true), "00:00");
    }

    #[test]
    fn test_extension_rule() {
        // Flagship budget with 3 pending tests and 4s left.
        let mut countdown = Countdown::new(4, 10, 5);
        assert_eq!(countdown.maybe_extend(3), Some(30));
        assert_eq!(countdown.remaining_secs(), 34);

        // At or above the watermark nothing changes.
        let mut countdown = Countdown::new(5, 10, 5);
        assert_eq!(countdown.maybe_extend(3), None);
        assert_eq!(countdown.remaining_secs(), 5);

        // Nothing pending, nothing added.
        let mut countdown = Countdown::new(0, 10, 5);
        assert_eq!(countdown.maybe_extend(0), None);
        assert_eq!(countdown.remaining_secs(), 0);
    }

    #[test]
    fn test_finalizing_indicator() {
        let countdown = Countdown::new(0, 6, 5);
        assert_eq!(countdown.remaining_display(0.995, true), FINALIZING);
        assert_eq!(countdown.remaining_display(0.95, true), "00:00");
        // Finished runs pin to zero.
        assert_eq!(Countdown::new(42, 6, 5).remaining_display(1.0, false), "00:00");
    }

    #[test]
    fn test_idle_keeps_configured_value() {
        let countdown = Countdown::new(120, 6, 5);
        assert_eq!(countdown.remaining_display(0.0, false), "02:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_independent_of_extensions() {
        let mut countdown = Countdown::new(1, 6, 5);
        let start = Instant::now();
        countdown.start(start);
        tokio::time::advance(Duration::from_secs(75)).await;
        countdown.maybe_extend(10);
        assert_eq!(countdown.elapsed_display(Instant::now()), "01:15");
        assert_eq!(Countdown::default().elapsed_secs(Instant::now()), 0);
    }
}
