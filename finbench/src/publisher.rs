//! Completion envelope and its replaying one-slot publisher.

use std::sync::Arc;

use finbench_telemetry::DetailedScore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

/// Published summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEnvelope {
    /// Run category, e.g. `"CPU"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub run_id: Uuid,
    pub single_core_score: f64,
    pub multi_core_score: f64,
    pub final_score: f64,
    pub normalized_score: f64,
    pub rating: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub performance_metrics: Map<String, Value>,
    pub detailed_results: Vec<DetailedScore>,
}

/// Holds the latest envelope. Subscribers attaching after publication
/// still observe it.
#[derive(Clone)]
pub struct CompletionPublisher {
    slot: Arc<watch::Sender<Option<Arc<CompletionEnvelope>>>>,
}

impl CompletionPublisher {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Publish once per run. A second envelope for the same run id is
    /// dropped and `false` returned.
    pub fn publish(&self, envelope: Arc<CompletionEnvelope>) -> bool {
        let run_id = envelope.run_id;
        let published = self.slot.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|current| current.run_id == run_id) {
                return false;
            }
            *slot = Some(envelope);
            true
        });

        if published {
            info!(%run_id, "Completion envelope published");
        } else {
            warn!(%run_id, "Duplicate completion for run ignored");
        }
        published
    }

    pub fn latest(&self) -> Option<Arc<CompletionEnvelope>> {
        self.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> CompletionSubscription {
        CompletionSubscription {
            rx: self.slot.subscribe(),
        }
    }
}

impl Default for CompletionPublisher {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CompletionSubscription {
    rx: watch::Receiver<Option<Arc<CompletionEnvelope>>>,
}

impl CompletionSubscription {
    /// The latest envelope, waiting for the first one if none exists yet.
    ///
    /// Returns `None` once the publisher is gone without ever publishing.
    pub async fn latest(&mut self) -> Option<Arc<CompletionEnvelope>> {
        self.rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|slot| (*slot).clone())
    }

    /// Wait for an envelope newer than the last one seen.
    pub async fn next(&mut self) -> Option<Arc<CompletionEnvelope>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}
