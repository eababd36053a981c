use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Swap,
    Deposit,
    Withdraw,
    RegisterKey,
    Status,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Swap => "swap",
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::RegisterKey => "register_key",
            Self::Status => "status",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressOutcome {
    Success,
    /// No market right now; expected and non-fatal.
    Unavailable,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event_id: String,
    pub correlation_id: String,
    pub operation: Operation,
    pub event_type: String,
    pub state: String,
    pub outcome: ProgressOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        correlation_id: impl Into<String>,
        operation: Operation,
        event_type: impl Into<String>,
        state: impl Into<String>,
        outcome: ProgressOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.into(),
            operation,
            event_type: event_type.into(),
            state: state.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attaches a remote payload as compact JSON.
    pub fn with_payload<T: Serialize>(self, key: impl Into<String>, payload: &T) -> Self {
        let rendered = serde_json::to_string(payload)
            .unwrap_or_else(|error| format!("<unserializable: {error}>"));
        self.with_metadata(key, rendered)
    }

    /// One-line rendering used for chat transcripts.
    pub fn summary(&self) -> String {
        let mut line = format!("[{}] {}", self.event_type, self.state);
        if let Some(error) = self.metadata.get("error") {
            line.push_str(&format!(": {error}"));
        } else if let Some(detail) = self.metadata.get("detail") {
            line.push_str(&format!(": {detail}"));
        }
        line
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryProgressSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl InMemoryProgressSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }
}

impl ProgressSink for InMemoryProgressSink {
    fn emit(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn emit(&self, event: ProgressEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.outcome {
            ProgressOutcome::Failed => warn!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                operation = event.operation.as_str(),
                state = %event.state,
                metadata = %metadata,
                "operation step failed"
            ),
            _ => info!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                operation = event.operation.as_str(),
                state = %event.state,
                metadata = %metadata,
                "operation step recorded"
            ),
        }
    }
}

#[derive(Clone, Default)]
pub struct FanoutProgressSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutProgressSink {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ProgressSink for FanoutProgressSink {
    fn emit(&self, event: ProgressEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
