//! Configuration loading for finbench.
//!
//! Settings come from `config.toml` (explicit path or the platform config
//! directory), then `FINBENCH_*` environment overrides. CLI flags are applied
//! on top by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{Category, Preset};

const CONFIG_DIR_NAME: &str = "finbench";
const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_PREFIX: &str = "FINBENCH_";

/// Invalid environment override. The file or default value is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: &'static str,
        value: String,
    },
}

/// Top-level configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub run: RunConfig,
    pub countdown: CountdownConfig,
    pub store: StoreConfig,
}

/// Run pacing and supervision settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Default workload preset name.
    pub preset: String,
    /// Default run category.
    pub category: Category,
    /// Fixed warm-up delay before the executor starts.
    pub warmup_delay_ms: u64,
    /// Upper bound on the wait for the terminal summary. Unset waits forever.
    pub summary_timeout_secs: Option<u64>,
    /// Period of the system sampler / countdown tick.
    pub sampler_interval_ms: u64,
    /// Grace period for the event collector to drain after the summary.
    pub collector_drain_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            preset: Preset::Mid.as_str().to_string(),
            category: Category::Cpu,
            warmup_delay_ms: 2_000,
            summary_timeout_secs: None,
            sampler_interval_ms: 1_000,
            collector_drain_ms: 500,
        }
    }
}

/// Countdown budget tables.
///
/// These are presentation constants, not measured timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    pub ai_budget_secs: u64,
    pub cpu_flagship_secs: u64,
    pub cpu_mid_secs: u64,
    pub cpu_slow_secs: u64,
    pub cpu_default_secs: u64,
    /// Remaining-seconds threshold below which a STARTED event re-extends.
    pub low_watermark_secs: u64,
    pub extend_flagship_secs: u64,
    pub extend_mid_secs: u64,
    pub extend_slow_secs: u64,
    pub extend_default_secs: u64,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            ai_budget_secs: 100,
            cpu_flagship_secs: 200,
            cpu_mid_secs: 120,
            cpu_slow_secs: 60,
            cpu_default_secs: 120,
            low_watermark_secs: 5,
            extend_flagship_secs: 10,
            extend_mid_secs: 6,
            extend_slow_secs: 3,
            extend_default_secs: 6,
        }
    }
}

impl CountdownConfig {
    /// Starting countdown budget for a run.
    pub fn initial_budget_secs(&self, category: Category, preset: Preset) -> u64 {
        match category {
            Category::Ai => self.ai_budget_secs,
            Category::Cpu => match preset {
                Preset::Flagship => self.cpu_flagship_secs,
                Preset::Mid => self.cpu_mid_secs,
                Preset::Slow => self.cpu_slow_secs,
                Preset::Unspecified => self.cpu_default_secs,
            },
        }
    }

    /// Seconds added per pending test when the countdown runs low.
    pub fn per_test_budget_secs(&self, preset: Preset) -> u64 {
        match preset {
            Preset::Flagship => self.extend_flagship_secs,
            Preset::Mid => self.extend_mid_secs,
            Preset::Slow => self.extend_slow_secs,
            Preset::Unspecified => self.extend_default_secs,
        }
    }
}

/// Result persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSONL results file. Defaults to `<data dir>/results.jsonl`.
    pub results_file: Option<PathBuf>,
}

impl BenchConfig {
    /// Apply `FINBENCH_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Vec<ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides using an arbitrary variable lookup.
    ///
    /// All invalid values are collected so they can be reported at once.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Vec<ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = Vec::new();
        let var = |name: &str| {
            let full = format!("{ENV_PREFIX}{name}");
            lookup(&full).map(|value| (full, value))
        };

        if let Some((_, value)) = var("PRESET") {
            self.run.preset = value;
        }

        if let Some((name, value)) = var("CATEGORY") {
            match value.parse::<Category>() {
                Ok(category) => self.run.category = category,
                Err(_) => errors.push(ConfigError::InvalidValue {
                    var: name,
                    expected: "cpu or ai",
                    value,
                }),
            }
        }

        if let Some((name, value)) = var("WARMUP_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) => self.run.warmup_delay_ms = ms,
                Err(_) => errors.push(ConfigError::InvalidValue {
                    var: name,
                    expected: "milliseconds",
                    value,
                }),
            }
        }

        if let Some((name, value)) = var("SUMMARY_TIMEOUT_SECS") {
            match value.trim() {
                "" | "0" | "none" => self.run.summary_timeout_secs = None,
                raw => match raw.parse::<u64>() {
                    Ok(secs) => self.run.summary_timeout_secs = Some(secs),
                    Err(_) => errors.push(ConfigError::InvalidValue {
                        var: name,
                        expected: "seconds",
                        value,
                    }),
                },
            }
        }

        if let Some((_, value)) = var("RESULTS_FILE")
            && !value.trim().is_empty()
        {
            self.store.results_file = Some(PathBuf::from(value));
        }

        for error in &errors {
            warn!("{}", error);
        }
        errors
    }
}

/// Get the configuration directory path.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "finbench", CONFIG_DIR_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path used for default result storage.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "finbench", CONFIG_DIR_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Load configuration from file. A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<BenchConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => match config_dir() {
            Some(dir) => dir.join(CONFIG_FILE_NAME),
            None => {
                debug!("No config directory available, using defaults");
                return Ok(BenchConfig::default());
            }
        },
    };

    if !config_path.exists() {
        debug!("Config not found at {:?}, using defaults", config_path);
        return Ok(BenchConfig::default());
    }

    info!("Loading config from {:?}", config_path);
    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config from {:?}", config_path))?;

    let config: BenchConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config from {:?}", config_path))?;

    Ok(config)
}
