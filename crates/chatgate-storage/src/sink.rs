use std::sync::Mutex;

use serde_json::Value;

/// Append-only, fire-and-forget publication of structured documents.
/// `publish` must never block the caller nor report failure.
pub trait EventSink: Send + Sync {
    fn publish(&self, topic: &str, document: Value);

    /// Documents discarded because the sink could not accept them.
    fn dropped(&self) -> u64 {
        0
    }
}

/// Keeps everything in memory; used by tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<(String, Value)>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn topic(&self, topic: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|(name, _)| name == topic)
            .map(|(_, document)| document)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn publish(&self, topic: &str, document: Value) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push((topic.to_string(), document));
        }
    }
}
