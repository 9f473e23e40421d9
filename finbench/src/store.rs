//! Result persistence collaborator.

use std::future::Future;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::pin::Pin;

use finbench_common::{TestCategory, WorkloadKind};
use finbench_telemetry::{DetailedScore, ScoreSummary};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::publisher::CompletionEnvelope;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("result store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode result record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One row per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterEntity {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub device_model: String,
    pub total_score: f64,
    pub single_core_score: f64,
    pub multi_core_score: f64,
    pub normalized_score: f64,
    pub detailed_results_json: String,
    pub performance_metrics_json: String,
}

/// Scores of one workload kind across its single- and multi-core tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailEntity {
    pub kind: String,
    pub single_core_score: f64,
    pub multi_core_score: f64,
}

/// A persisted run as written by [`JsonlResultStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub master: MasterEntity,
    pub details: Vec<DetailEntity>,
}

impl MasterEntity {
    pub fn from_envelope(
        envelope: &CompletionEnvelope,
        device_model: &str,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            timestamp: envelope.timestamp,
            kind: envelope.kind.clone(),
            device_model: device_model.to_string(),
            total_score: envelope.final_score,
            single_core_score: envelope.single_core_score,
            multi_core_score: envelope.multi_core_score,
            normalized_score: envelope.normalized_score,
            detailed_results_json: serde_json::to_string(&envelope.detailed_results)?,
            performance_metrics_json: serde_json::to_string(&envelope.performance_metrics)?,
        })
    }
}

/// Group single- and multi-core test scores by workload kind, in catalog
/// order. Tests outside the two core tiers have no detail row.
pub fn detail_entities(summary: &ScoreSummary) -> Vec<DetailEntity> {
    let score_of = |kind: WorkloadKind, category: TestCategory| -> f64 {
        let name = kind.test_name(category);
        summary
            .detailed_results
            .iter()
            .filter(|d: &&DetailedScore| d.name == name)
            .map(|d| d.score)
            .sum()
    };

    WorkloadKind::ALL
        .into_iter()
        .filter(|kind| {
            summary.detailed_results.iter().any(|d| {
                WorkloadKind::from_test_name(&d.name).is_some_and(|(found, _)| found == *kind)
            })
        })
        .map(|kind| DetailEntity {
            kind: kind.label().to_string(),
            single_core_score: score_of(kind, TestCategory::SingleCore),
            multi_core_score: score_of(kind, TestCategory::MultiCore),
        })
        .collect()
}

pub type SaveFuture = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>>;

/// Accepts finished runs. Storage mechanics are up to the implementation.
pub trait ResultStore: Send + Sync {
    fn save(&self, master: MasterEntity, details: Vec<DetailEntity>) -> SaveFuture;
}

/// Appends one JSON line per run.
#[derive(Debug, Clone)]
pub struct JsonlResultStore {
    path: PathBuf,
}

impl JsonlResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored run, skipping lines that do not parse.
    pub fn load(path: &Path) -> Result<Vec<StoredRun>, StoreError> {
        let file = std::fs::File::open(path)?;
        let mut runs = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredRun>(&line) {
                Ok(run) => runs.push(run),
                Err(e) => warn!("Skipping invalid result line: {}", e),
            }
        }
        debug!("Loaded {} runs from {:?}", runs.len(), path);
        Ok(runs)
    }

    async fn append(path: PathBuf, run: StoredRun) -> Result<(), StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let mut line = serde_json::to_string(&run)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl ResultStore for JsonlResultStore {
    fn save(&self, master: MasterEntity, details: Vec<DetailEntity>) -> SaveFuture {
        Box::pin(Self::append(
            self.path.clone(),
            StoredRun { master, details },
        ))
    }
}
