//! Diagnostic event bus for run lifecycle updates (JSON lines).

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

const MIN_CAPACITY: usize = 256;

pub const RUN_STARTED: &str = "run:started";
pub const TEST_STARTED: &str = "test:started";
pub const TEST_COMPLETED: &str = "test:completed";
pub const PROGRESS: &str = "progress";
pub const RUN_COMPLETED: &str = "run:completed";
pub const RUN_FAILED: &str = "run:failed";
pub const RUN_CANCELLED: &str = "run:cancelled";

#[derive(Serialize)]
struct Line<'a, T> {
    event: &'a str,
    data: &'a T,
    timestamp: String,
}

/// Broadcast channel of run events. Emitting with no subscribers is a no-op.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<String>,
}

impl EventBus {
    /// Capacity never drops below 256 lines; progress bursts would lag
    /// slow receivers otherwise.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(MIN_CAPACITY));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn emit<T: Serialize>(&self, event: &str, data: &T) {
        let line = Line {
            event,
            data,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        match serde_json::to_string(&line) {
            Ok(json) => {
                // No receivers is fine.
                let _ = self.tx.send(json);
            }
            Err(e) => warn!(event, "Dropping unserializable event: {}", e),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }
}
