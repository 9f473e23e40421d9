//! Core data model shared by the executor, the scoring engine and the
//! orchestration core.
//!
//! The catalog is fixed per [`Category`] and its ordering is significant:
//! CPU runs sequence every single-core test before any multi-core test.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Top-level test group selecting the catalog and budget tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[default]
    #[serde(rename = "CPU", alias = "cpu")]
    Cpu,
    #[serde(rename = "AI", alias = "ai")]
    Ai,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cpu => "CPU",
            Category::Ai => "AI",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Category`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category '{0}' (expected cpu or ai)")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Category::Cpu),
            "ai" => Ok(Category::Ai),
            _ => Err(ParseCategoryError(s.to_string())),
        }
    }
}

/// Workload intensity tier.
///
/// Parsing never fails: anything unrecognised is [`Preset::Unspecified`],
/// which selects the default row of every preset-keyed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Slow,
    Mid,
    Flagship,
    #[default]
    Unspecified,
}

impl Preset {
    /// Lenient parse with the aliases accepted by the workload executor.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "slow" => Preset::Slow,
            "mid" | "medium" => Preset::Mid,
            "flagship" | "high" | "fast" => Preset::Flagship,
            _ => Preset::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Slow => "slow",
            Preset::Mid => "mid",
            Preset::Flagship => "flagship",
            Preset::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display grouping of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestCategory {
    SingleCore,
    MultiCore,
    Other,
}

/// Immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestDescriptor {
    pub name: String,
    pub category: TestCategory,
}

impl TestDescriptor {
    pub fn new(name: impl Into<String>, category: TestCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }
}

/// The ten CPU workload kinds, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    PrimeGeneration,
    Fibonacci,
    MatrixMultiplication,
    HashComputing,
    StringSorting,
    RayTracing,
    Compression,
    MonteCarloPi,
    JsonParsing,
    NQueens,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 10] = [
        WorkloadKind::PrimeGeneration,
        WorkloadKind::Fibonacci,
        WorkloadKind::MatrixMultiplication,
        WorkloadKind::HashComputing,
        WorkloadKind::StringSorting,
        WorkloadKind::RayTracing,
        WorkloadKind::Compression,
        WorkloadKind::MonteCarloPi,
        WorkloadKind::JsonParsing,
        WorkloadKind::NQueens,
    ];

    /// Kind label shared by the single- and multi-core variants.
    pub fn label(&self) -> &'static str {
        match self {
            WorkloadKind::PrimeGeneration => "Prime Generation",
            WorkloadKind::Fibonacci => "Fibonacci",
            WorkloadKind::MatrixMultiplication => "Matrix Multiplication",
            WorkloadKind::HashComputing => "Hash Computing",
            WorkloadKind::StringSorting => "String Sorting",
            WorkloadKind::RayTracing => "Ray Tracing",
            WorkloadKind::Compression => "Compression",
            WorkloadKind::MonteCarloPi => "Monte Carlo π",
            WorkloadKind::JsonParsing => "JSON Parsing",
            WorkloadKind::NQueens => "N-Queens",
        }
    }

    /// Full test name for the given core mode.
    pub fn test_name(&self, category: TestCategory) -> String {
        let multi = category == TestCategory::MultiCore;
        let suffix = match self {
            WorkloadKind::Fibonacci if multi => "Fibonacci Memoized",
            WorkloadKind::Fibonacci => "Fibonacci Recursive",
            other => other.label(),
        };
        let prefix = if multi { MULTI_CORE_PREFIX } else { SINGLE_CORE_PREFIX };
        format!("{prefix} {suffix}")
    }

    /// Resolve the workload kind and core mode from a catalog test name.
    pub fn from_test_name(name: &str) -> Option<(WorkloadKind, TestCategory)> {
        [TestCategory::SingleCore, TestCategory::MultiCore]
            .into_iter()
            .flat_map(|category| Self::ALL.into_iter().map(move |kind| (kind, category)))
            .find(|(kind, category)| kind.test_name(*category) == name)
    }
}

pub const SINGLE_CORE_PREFIX: &str = "Single-Core";
pub const MULTI_CORE_PREFIX: &str = "Multi-Core";

const AI_TESTS: [&str; 5] = [
    "Image Classification",
    "Object Detection",
    "Text Embedding",
    "Speech Recognition",
    "LLM Token Generation",
];

/// Build the ordered catalog for a run category.
pub fn catalog(category: Category) -> Vec<TestDescriptor> {
    match category {
        Category::Cpu => {
            let single = WorkloadKind::ALL.into_iter().map(|kind| {
                TestDescriptor::new(
                    kind.test_name(TestCategory::SingleCore),
                    TestCategory::SingleCore,
                )
            });
            let multi = WorkloadKind::ALL.into_iter().map(|kind| {
                TestDescriptor::new(
                    kind.test_name(TestCategory::MultiCore),
                    TestCategory::MultiCore,
                )
            });
            single.chain(multi).collect()
        }
        Category::Ai => AI_TESTS
            .into_iter()
            .map(|name| TestDescriptor::new(name, TestCategory::Other))
            .collect(),
    }
}

/// Outcome of one workload, produced by the executor or synthesized as an
/// invalid stand-in when the test body fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    pub name: String,
    #[serde(alias = "execution_time_ms", deserialize_with = "lenient_f64")]
    pub execution_time_ms: f64,
    #[serde(alias = "ops_per_second", deserialize_with = "lenient_f64")]
    pub ops_per_second: f64,
    #[serde(alias = "is_valid", default)]
    pub is_valid: bool,
    #[serde(alias = "metrics_json", default)]
    pub metrics_json: String,
}

impl BenchmarkResult {
    /// Zero-metric result marking a failed test.
    pub fn invalid(name: impl Into<String>, execution_time_ms: f64) -> Self {
        Self {
            name: name.into(),
            execution_time_ms,
            ops_per_second: 0.0,
            is_valid: false,
            metrics_json: "{}".to_string(),
        }
    }
}

/// JSON encoders write non-finite floats as `null`; read them back as NaN so
/// the scoring engine can sanitize them instead of rejecting the summary.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Lifecycle event mode. `Test` marks the warm-up phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventMode {
    Single,
    Multi,
    Test,
}

impl From<TestCategory> for EventMode {
    fn from(category: TestCategory) -> Self {
        match category {
            TestCategory::MultiCore => EventMode::Multi,
            TestCategory::SingleCore | TestCategory::Other => EventMode::Single,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventState {
    Started,
    Completed,
}

/// One lifecycle event emitted by the workload executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkEvent {
    pub test_name: String,
    pub mode: EventMode,
    pub state: EventState,
    pub time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_mode: Option<String>,
}

impl BenchmarkEvent {
    pub fn started(test_name: impl Into<String>, mode: EventMode) -> Self {
        Self {
            test_name: test_name.into(),
            mode,
            state: EventState::Started,
            time_ms: 0,
            acceleration_mode: None,
        }
    }

    pub fn completed(test_name: impl Into<String>, mode: EventMode, time_ms: u64) -> Self {
        Self {
            test_name: test_name.into(),
            mode,
            state: EventState::Completed,
            time_ms,
            acceleration_mode: None,
        }
    }

    #[must_use]
    pub fn with_acceleration_mode(mut self, mode: impl Into<String>) -> Self {
        self.acceleration_mode = Some(mode.into());
        self
    }
}

/// Errors decoding the executor's terminal summary.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("terminal summary is empty")]
    Empty,

    #[error("malformed terminal summary: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The single JSON payload marking the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalSummary {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub single_core_score: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub multi_core_score: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub final_score: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub normalized_score: f64,
    pub detailed_results: Vec<BenchmarkResult>,
}

impl TerminalSummary {
    pub fn parse(raw: &str) -> Result<Self, SummaryError> {
        if raw.trim().is_empty() {
            return Err(SummaryError::Empty);
        }
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
