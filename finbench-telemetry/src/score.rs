//! Score calculation and normalization engine.
//!
//! Raw throughput varies by orders of magnitude between workloads (a prime
//! sieve reports millions of ops/sec, N-Queens a handful), so every test is
//! scaled by a per-workload factor before summing into tier scores.
//!
//! ## Weights
//!
//! - Single-core: 35%
//! - Multi-core: 65%
//!
//! The weighted total is divided by a fixed constant for display scaling.

use finbench_common::{BenchmarkResult, MULTI_CORE_PREFIX, SINGLE_CORE_PREFIX, TestCategory};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Weight of the single-core tier in the final score.
pub const SINGLE_CORE_WEIGHT: f64 = 0.35;
/// Weight of the multi-core tier in the final score.
pub const MULTI_CORE_WEIGHT: f64 = 0.65;
/// Divisor producing the normalized display score.
pub const NORMALIZATION_CONSTANT: f64 = 2500.0;
/// Factor applied when no keyword matches a test name.
pub const DEFAULT_SCALING_FACTOR: f64 = 0.0001;

/// Ordered `(keyword, factor)` table. First case-insensitive substring match wins.
const SCALING_FACTORS: [(&str, f64); 10] = [
    ("Prime", 0.00001),
    ("Fibonacci", 0.012),
    ("Matrix", 0.025),
    ("Hash", 0.01),
    ("String", 0.015),
    ("Ray", 0.006),
    ("Compression", 0.07),
    ("Monte Carlo", 0.07),
    ("JSON", 0.00004),
    ("Queens", 0.07),
];

/// Map non-finite throughput to zero so one runaway or failed test cannot
/// poison an aggregate.
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn scaling_entry(test_name: &str) -> Option<(&'static str, f64)> {
    let name = test_name.to_lowercase();
    SCALING_FACTORS
        .iter()
        .find(|(keyword, _)| name.contains(&keyword.to_lowercase()))
        .copied()
}

/// Per-test scaling factor.
pub fn scaling_factor(test_name: &str) -> f64 {
    scaling_entry(test_name).map_or(DEFAULT_SCALING_FACTOR, |(_, factor)| factor)
}

/// Scaled contribution of a single result.
pub fn individual_score(result: &BenchmarkResult) -> f64 {
    sanitize(result.ops_per_second) * scaling_factor(&result.name)
}

/// Sum of scaled throughput over results whose name contains `prefix`
/// (case-insensitive). Empty selections score zero.
pub fn category_score(results: &[BenchmarkResult], prefix: &str) -> f64 {
    let prefix = prefix.to_lowercase();
    results
        .iter()
        .filter(|result| result.name.to_lowercase().contains(&prefix))
        .map(individual_score)
        .sum()
}

pub fn final_weighted_score(single_core_score: f64, multi_core_score: f64) -> f64 {
    single_core_score * SINGLE_CORE_WEIGHT + multi_core_score * MULTI_CORE_WEIGHT
}

pub fn normalized_score(final_weighted_score: f64) -> f64 {
    final_weighted_score / NORMALIZATION_CONSTANT
}

/// Multi/single ratio, zero when the single-core score is not positive.
pub fn core_ratio(single_core_score: f64, multi_core_score: f64) -> f64 {
    if single_core_score > 0.0 {
        multi_core_score / single_core_score
    } else {
        0.0
    }
}

/// Tier grouping of a test by its name prefix.
pub fn classify(test_name: &str) -> TestCategory {
    let name = test_name.to_lowercase();
    if name.contains(&SINGLE_CORE_PREFIX.to_lowercase()) {
        TestCategory::SingleCore
    } else if name.contains(&MULTI_CORE_PREFIX.to_lowercase()) {
        TestCategory::MultiCore
    } else {
        TestCategory::Other
    }
}

/// Human-readable rating band of a final weighted score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Exceptional,
    High,
    Good,
    Moderate,
    Basic,
    Low,
}

impl Rating {
    pub fn from_score(final_weighted_score: f64) -> Self {
        match sanitize(final_weighted_score) {
            x if x >= 1800.0 => Rating::Exceptional,
            x if x >= 1500.0 => Rating::High,
            x if x >= 1000.0 => Rating::Good,
            x if x >= 600.0 => Rating::Moderate,
            x if x >= 300.0 => Rating::Basic,
            _ => Rating::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rating::Exceptional => "Exceptional Performance",
            Rating::High => "High Performance",
            Rating::Good => "Good Performance",
            Rating::Moderate => "Moderate Performance",
            Rating::Basic => "Basic Performance",
            Rating::Low => "Low Performance",
        }
    }
}

/// Per-test breakdown row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedScore {
    pub name: String,
    pub category: TestCategory,
    pub execution_time_ms: f64,
    /// Sanitized throughput.
    pub ops_per_second: f64,
    pub scaling_factor: f64,
    pub score: f64,
    pub is_valid: bool,
}

impl DetailedScore {
    fn from_result(result: &BenchmarkResult) -> Self {
        Self {
            name: result.name.clone(),
            category: classify(&result.name),
            execution_time_ms: sanitize(result.execution_time_ms),
            ops_per_second: sanitize(result.ops_per_second),
            scaling_factor: scaling_factor(&result.name),
            score: individual_score(result),
            is_valid: result.is_valid,
        }
    }
}

/// Derived, immutable score summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub individual_scores: Vec<BenchmarkResult>,
    pub single_core_score: f64,
    pub multi_core_score: f64,
    pub core_ratio: f64,
    pub final_weighted_score: f64,
    pub normalized_score: f64,
    pub detailed_results: Vec<DetailedScore>,
}

impl ScoreSummary {
    /// Score a run from its individual results.
    pub fn compute(results: Vec<BenchmarkResult>) -> Self {
        let single_core_score = category_score(&results, SINGLE_CORE_PREFIX);
        let multi_core_score = category_score(&results, MULTI_CORE_PREFIX);
        let final_weighted = final_weighted_score(single_core_score, multi_core_score);

        let invalid = results.iter().filter(|r| !r.is_valid).count();
        debug!(
            results = results.len(),
            invalid, "Scoring benchmark results"
        );

        let summary = Self {
            detailed_results: results.iter().map(DetailedScore::from_result).collect(),
            individual_scores: results,
            single_core_score,
            multi_core_score,
            core_ratio: core_ratio(single_core_score, multi_core_score),
            final_weighted_score: final_weighted,
            normalized_score: normalized_score(final_weighted),
        };

        info!(
            single_core = format!("{:.2}", summary.single_core_score),
            multi_core = format!("{:.2}", summary.multi_core_score),
            ratio = format!("{:.2}", summary.core_ratio),
            final_score = format!("{:.2}", summary.final_weighted_score),
            normalized = format!("{:.4}", summary.normalized_score),
            "Score calculated"
        );

        summary
    }

    /// All-zero summary carrying whatever results were tracked locally.
    pub fn fallback(results: Vec<BenchmarkResult>) -> Self {
        Self {
            detailed_results: results
                .iter()
                .map(|result| DetailedScore {
                    score: 0.0,
                    ..DetailedScore::from_result(result)
                })
                .collect(),
            individual_scores: results,
            single_core_score: 0.0,
            multi_core_score: 0.0,
            core_ratio: 0.0,
            final_weighted_score: 0.0,
            normalized_score: 0.0,
        }
    }

    pub fn rating(&self) -> Rating {
        Rating::from_score(self.final_weighted_score)
    }
}
