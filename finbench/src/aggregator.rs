//! Turns a scored run into the completion envelope, publishes it and hands
//! it to the result store.

use std::sync::Arc;

use chrono::Utc;
use finbench_common::Category;
use finbench_telemetry::ScoreSummary;
use finbench_telemetry::score::sanitize;
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{self, EventBus};
use crate::publisher::{CompletionEnvelope, CompletionPublisher};
use crate::store::{MasterEntity, ResultStore, detail_entities};

/// Device label recorded with persisted runs when none is configured.
pub fn default_device_model() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

pub struct ResultAggregator {
    publisher: CompletionPublisher,
    store: Option<Arc<dyn ResultStore>>,
    bus: EventBus,
    device_model: String,
}

impl ResultAggregator {
    pub fn new(publisher: CompletionPublisher, bus: EventBus) -> Self {
        Self {
            publisher,
            store: None,
            bus,
            device_model: default_device_model(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_device_model(mut self, device_model: impl Into<String>) -> Self {
        self.device_model = device_model.into();
        self
    }

    pub fn publisher(&self) -> &CompletionPublisher {
        &self.publisher
    }

    /// Build the envelope for a finished run.
    pub fn build_envelope(
        run_id: Uuid,
        category: Category,
        summary: &ScoreSummary,
        performance_metrics: Map<String, Value>,
    ) -> CompletionEnvelope {
        CompletionEnvelope {
            kind: category.as_str().to_string(),
            run_id,
            single_core_score: sanitize(summary.single_core_score),
            multi_core_score: sanitize(summary.multi_core_score),
            final_score: sanitize(summary.final_weighted_score),
            normalized_score: sanitize(summary.normalized_score),
            rating: summary.rating().label().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            performance_metrics,
            detailed_results: summary.detailed_results.clone(),
        }
    }

    /// Publish the run and start persisting it in the background.
    ///
    /// Persistence failures are logged and never reach the caller. The
    /// returned handle is only useful for waiting on the save.
    pub fn finish(
        &self,
        run_id: Uuid,
        category: Category,
        summary: &ScoreSummary,
        performance_metrics: Map<String, Value>,
    ) -> (Arc<CompletionEnvelope>, Option<JoinHandle<()>>) {
        let envelope = Arc::new(Self::build_envelope(
            run_id,
            category,
            summary,
            performance_metrics,
        ));

        if self.publisher.publish(Arc::clone(&envelope)) {
            self.bus.emit(
                events::RUN_COMPLETED,
                &json!({
                    "runId": run_id,
                    "finalScore": envelope.final_score,
                    "normalizedScore": envelope.normalized_score,
                    "rating": envelope.rating,
                }),
            );
        }

        let persist = self.persist(&envelope, summary);
        (envelope, persist)
    }

    fn persist(
        &self,
        envelope: &CompletionEnvelope,
        summary: &ScoreSummary,
    ) -> Option<JoinHandle<()>> {
        let store = Arc::clone(self.store.as_ref()?);
        let run_id = envelope.run_id;

        let master = match MasterEntity::from_envelope(envelope, &self.device_model) {
            Ok(master) => master,
            Err(e) => {
                warn!(%run_id, error = %e, "Failed to build result record");
                return None;
            }
        };
        let details = detail_entities(summary);
        debug!(%run_id, details = details.len(), "Persisting run");

        Some(tokio::spawn(async move {
            match store.save(master, details).await {
                Ok(()) => info!(%run_id, "Run results saved"),
                Err(e) => warn!(%run_id, error = %e, "Failed to save run results"),
            }
        }))
    }
}
