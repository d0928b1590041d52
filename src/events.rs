//! Per-run progress events and the run registry.
//!
//! Each triage run gets one bounded single-producer/single-consumer channel:
//! the run worker owns the sender, the streaming interface claims the
//! receiver. The registry is an explicit object passed by handle — no
//! process-wide globals — and an entry lives from run start until its
//! receiver is claimed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::triage::types::FinalAgentResponse;

/// Event channel capacity. A run emits on the order of a dozen events; the
/// buffer must hold all of them before a consumer attaches.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A progress event emitted during a run.
///
/// Every run's stream ends with exactly one terminal event (`Final` or
/// `Error`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Status {
        step: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
    },
    Final {
        data: FinalAgentResponse,
    },
    Error {
        message: String,
    },
}

impl RunEvent {
    /// Build a status event.
    pub fn status(step: &str, message: impl Into<String>, progress: u8) -> Self {
        Self::Status {
            step: step.to_string(),
            message: message.into(),
            progress: Some(progress),
        }
    }

    /// Synthetic heartbeat emitted by the stream consumer on idle timeout.
    pub fn heartbeat() -> Self {
        Self::Status {
            step: "heartbeat".to_string(),
            message: "Still working...".to_string(),
            progress: None,
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Error { .. })
    }

    /// SSE event name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Final { .. } => "final",
            Self::Error { .. } => "error",
        }
    }
}

/// Producer handle for one run's event channel.
///
/// Held by the run worker; the channel closes when the last emitter drops.
#[derive(Clone)]
pub struct RunEmitter {
    run_id: Uuid,
    tx: mpsc::Sender<RunEvent>,
}

impl RunEmitter {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Emit an event. A send failure means the consumer is gone — the run
    /// keeps going, its persistence side effects still matter.
    pub async fn emit(&self, event: RunEvent) {
        if self.tx.send(event).await.is_err() {
            debug!(run_id = %self.run_id, "Event dropped — consumer detached");
        }
    }

    /// Emit a status event.
    pub async fn status(&self, step: &str, message: impl Into<String>, progress: u8) {
        self.emit(RunEvent::status(step, message, progress)).await;
    }
}

/// Registry mapping run ids to their unclaimed event receivers.
pub struct RunRegistry {
    runs: RwLock<HashMap<Uuid, mpsc::Receiver<RunEvent>>>,
}

impl RunRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runs: RwLock::new(HashMap::new()),
        })
    }

    /// Register a new run: creates its event channel and returns the
    /// producer handle. The receiver waits in the registry until claimed.
    pub async fn open(&self, run_id: Uuid) -> RunEmitter {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.runs.write().await.insert(run_id, rx);
        debug!(run_id = %run_id, "Run registered");
        RunEmitter { run_id, tx }
    }

    /// Claim the receiver for a run. Single-consumer: the first caller gets
    /// it, later callers (and unknown run ids) get `None`.
    pub async fn subscribe(&self, run_id: Uuid) -> Option<mpsc::Receiver<RunEvent>> {
        self.runs.write().await.remove(&run_id)
    }

    /// Number of runs with unclaimed receivers.
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::types::{Category, ClassificationResult, ClarificationResult, SalesIntent};

    fn final_event() -> RunEvent {
        RunEvent::Final {
            data: FinalAgentResponse {
                category: Category::Unknown,
                classification: ClassificationResult {
                    category: Category::Unknown,
                    intent: SalesIntent::NeedMoreInformation,
                    confidence: 0.2,
                    reasoning: "Insufficient signal.".to_string(),
                },
                sales: None,
                support: None,
                clarification: Some(ClarificationResult {
                    message_to_rep: "Please clarify.".to_string(),
                    follow_up_questions: vec![],
                }),
            },
        }
    }

    #[tokio::test]
    async fn open_emit_subscribe_roundtrip() {
        let registry = RunRegistry::new();
        let run_id = Uuid::new_v4();

        let emitter = registry.open(run_id).await;
        emitter.status("validate", "Validating input...", 5).await;
        emitter.emit(final_event()).await;
        drop(emitter);

        let mut rx = registry.subscribe(run_id).await.expect("receiver");
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, RunEvent::Status { .. }));
        assert!(!first.is_terminal());

        let second = rx.recv().await.unwrap();
        assert!(second.is_terminal());
        assert_eq!(second.label(), "final");

        // Channel closes once the emitter is gone.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribe_is_single_take() {
        let registry = RunRegistry::new();
        let run_id = Uuid::new_v4();
        let _emitter = registry.open(run_id).await;

        assert!(registry.subscribe(run_id).await.is_some());
        assert!(registry.subscribe(run_id).await.is_none());
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn unknown_run_has_no_receiver() {
        let registry = RunRegistry::new();
        assert!(registry.subscribe(Uuid::new_v4()).await.is_none());
    }

    #[test]
    fn event_serialization_shape() {
        let status = RunEvent::status("classify", "Classifying email...", 20);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["step"], "classify");
        assert_eq!(json["progress"], 20);

        let heartbeat = RunEvent::heartbeat();
        let json = serde_json::to_value(&heartbeat).unwrap();
        assert_eq!(json["step"], "heartbeat");
        assert!(json.get("progress").is_none());

        let error = RunEvent::Error {
            message: "boom".to_string(),
        };
        assert_eq!(error.label(), "error");
        assert!(error.is_terminal());
    }
}
