//! Lifecycle event sinks.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, Level};

/// Receives run and stage lifecycle events.
///
/// Event types are the dotted names in [`super::types`]. Stage events carry
/// `stage` and `year` in their payload.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Records one event.
    async fn emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing`, lifting `stage` and `year` out of the
/// payload into structured fields.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::debug()
    }
}

impl LoggingEventSink {
    /// Logs at DEBUG when `level` is DEBUG or TRACE, otherwise at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Info-level sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log(&self, event_type: &str, data: Option<&Value>) {
        let stage = data.and_then(|d| d.get("stage")).and_then(Value::as_u64);
        let year = data.and_then(|d| d.get("year")).and_then(Value::as_i64);
        let payload = data.map(Value::to_string).unwrap_or_default();
        if self.level >= Level::DEBUG {
            debug!(event = event_type, stage, year, payload = %payload, "Lifecycle event");
        } else {
            info!(event = event_type, stage, year, payload = %payload, "Lifecycle event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, data.as_ref());
    }
}

/// Keeps every event in memory for post-run inspection.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.read().clone()
    }

    /// Event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events whose type starts with `type_prefix`, so `"stage."` selects
    /// every stage event.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, Option<Value>)> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Stage indices of the events of exactly `event_type`.
    #[must_use]
    pub fn stages_of(&self, event_type: &str) -> Vec<u64> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .filter_map(|(_, data)| data.as_ref()?.get("stage")?.as_u64())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types;
    use serde_json::json;

    #[tokio::test]
    async fn test_logging_sink_accepts_partial_payloads() {
        let sink = LoggingEventSink::info();
        sink.emit(types::RUN_STARTED, Some(json!({"run_id": "base"}))).await;
        sink.emit(types::STAGE_BUILT, Some(json!({"stage": 0, "year": 2025}))).await;
        LoggingEventSink::default().emit(types::RUN_COMPLETED, None).await;
        NoOpEventSink.emit(types::RUN_HALTED, None).await;
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(types::STAGE_BUILT, Some(json!({"stage": 0, "year": 2025}))).await;
        sink.emit(types::STAGE_SOLVED, Some(json!({"stage": 0, "year": 2025}))).await;
        sink.emit(types::STAGE_BUILT, Some(json!({"stage": 1, "year": 2030}))).await;
        sink.emit(types::RUN_HALTED, None).await;

        assert_eq!(sink.len(), 4);
        assert_eq!(sink.events_of_type("stage.").len(), 3);
        assert_eq!(sink.stages_of(types::STAGE_BUILT), vec![0, 1]);
        assert_eq!(
            sink.event_types(),
            vec!["stage.built", "stage.solved", "stage.built", "run.halted"]
        );
        assert_eq!(sink.events()[0].1, Some(json!({"stage": 0, "year": 2025})));
    }
}
