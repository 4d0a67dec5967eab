use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::store::EventLogStore;
use crate::types::{LogLevel, NewLogRecord};

/// Bridges `tracing` events into the event log store, so every `info!`/`warn!`/
/// `error!` call anywhere in the process lands in the same queryable history as
/// the records components append directly.
pub struct EventLogLayer {
    store: Arc<EventLogStore>,
}

impl EventLogLayer {
    pub fn new(store: Arc<EventLogStore>) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for EventLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = LogLevel::from(*metadata.level());
        let source = metadata.target().to_string();

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let record = NewLogRecord {
            level,
            source,
            message: visitor.message.unwrap_or_default(),
            payload: visitor.into_payload(),
            session_id: None,
            chat_id: None,
        };

        // Logging must never panic the calling task; drop on store failure.
        let _ = self.store.append(record);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl MessageVisitor {
    fn into_payload(self) -> Option<serde_json::Value> {
        if self.fields.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(self.fields))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(text));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }
}
