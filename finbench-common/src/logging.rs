//! tracing setup shared by the finbench binaries.
//!
//! Console output goes to stderr by default so that stdout stays free for
//! JSON results. A file path adds a daily-rotated copy written through a
//! non-blocking worker.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

const ENV_LEVEL: &str = "FINBENCH_LOG_LEVEL";
const ENV_FORMAT: &str = "FINBENCH_LOG_FORMAT";
const ENV_FILE: &str = "FINBENCH_LOG_FILE";
const ENV_TARGETS: &str = "FINBENCH_LOG_TARGETS";
const DEFAULT_LOG_FILE: &str = "finbench.log";
const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per line.
    Json,
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level: trace, debug, info, warn, error or off.
    pub level: String,
    pub format: LogFormat,
    /// Daily-rotated log file written alongside the console.
    pub file_path: Option<PathBuf>,
    /// `(target, level)` directives appended to the base level.
    pub targets: Vec<(String, String)>,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub use_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file_path: None,
            targets: Vec::new(),
            with_target: true,
            with_thread_ids: false,
            use_stderr: true,
        }
    }
}

impl LogConfig {
    /// Read `FINBENCH_LOG_LEVEL`, `FINBENCH_LOG_FORMAT`, `FINBENCH_LOG_FILE`
    /// and `FINBENCH_LOG_TARGETS` (comma-separated `target=level`).
    pub fn from_env(default_level: &str) -> Self {
        Self::from_lookup(default_level, |name| std::env::var(name).ok())
    }

    /// Same as [`LogConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(default_level: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            level: lookup(ENV_LEVEL).unwrap_or_else(|| default_level.to_string()),
            ..Self::default()
        };
        if let Some(format) = lookup(ENV_FORMAT).and_then(|raw| raw.parse().ok()) {
            config.format = format;
        }
        config.file_path = lookup(ENV_FILE)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        if let Some(raw) = lookup(ENV_TARGETS) {
            config.targets = parse_targets(&raw);
        }
        config
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// The effective filter. `RUST_LOG` wins when it parses.
    pub fn env_filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some()
            && let Ok(filter) = EnvFilter::try_from_default_env()
        {
            return filter;
        }
        EnvFilter::new(self.directives())
    }

    fn directives(&self) -> String {
        std::iter::once(self.level.clone())
            .chain(
                self.targets
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    fn console_writer(&self) -> BoxMakeWriter {
        if self.use_stderr {
            BoxMakeWriter::new(std::io::stderr)
        } else {
            BoxMakeWriter::new(std::io::stdout)
        }
    }
}

/// Keeps the file writer flushing. Drop it last.
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// A second call in the same process keeps the first subscriber.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards> {
    let (writer, file_guard) = match config.file_path.as_deref() {
        Some(path) => {
            let (file, guard) = tracing_appender::non_blocking(rolling_file(path));
            (
                BoxMakeWriter::new(config.console_writer().and(file)),
                Some(guard),
            )
        }
        None => (config.console_writer(), None),
    };
    let ansi = file_guard.is_none() && config.format != LogFormat::Json;

    let installed = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(format_layer(config, writer, ansi))
        .try_init();
    if let Err(e) = installed {
        tracing::debug!("Keeping existing subscriber: {}", e);
    }

    Ok(LoggingGuards { _file: file_guard })
}

fn format_layer<S>(
    config: &LogConfig,
    writer: BoxMakeWriter,
    ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_ansi(ansi);
    match config.format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

fn rolling_file(path: &Path) -> tracing_appender::rolling::RollingFileAppender {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| DEFAULT_LOG_FILE.into());
    tracing_appender::rolling::daily(dir, name)
}

fn parse_targets(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            let (target, level) = entry.split_once('=')?;
            let target = target.trim();
            let level = level.trim().to_ascii_lowercase();
            (!target.is_empty() && LEVELS.contains(&level.as_str()))
                .then(|| (target.to_string(), level))
        })
        .collect()
}
