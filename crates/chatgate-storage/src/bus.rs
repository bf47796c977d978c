use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sink::EventSink;
use crate::store::StoreError;

/// Destination the queue worker drains into.
#[async_trait]
pub trait EventWriter: Send + Sync {
    async fn write(&self, topic: &str, document: &Value) -> Result<(), StoreError>;
}

#[derive(Debug)]
struct Envelope {
    topic: String,
    document: Value,
}

/// Bounded, non-blocking front for an `EventWriter`. A full queue drops the
/// document and bumps a counter instead of applying backpressure.
#[derive(Debug, Clone)]
pub struct QueuedEventSink {
    tx: mpsc::Sender<Envelope>,
    dropped: Arc<AtomicU64>,
}

impl QueuedEventSink {
    /// Starts the drain worker. It exits once every clone of the sink is
    /// dropped and the queue is empty.
    pub fn spawn(writer: Arc<dyn EventWriter>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(drain(rx, writer));
        let sink = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, handle)
    }
}

impl EventSink for QueuedEventSink {
    fn publish(&self, topic: &str, document: Value) {
        let envelope = Envelope {
            topic: topic.to_string(),
            document,
        };
        let reason = match self.tx.try_send(envelope) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => "queue_full",
            Err(TrySendError::Closed(_)) => "queue_closed",
        };
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(event = "event_dropped", topic = %topic, reason, dropped_total = total);
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn drain(mut rx: mpsc::Receiver<Envelope>, writer: Arc<dyn EventWriter>) {
    while let Some(envelope) = rx.recv().await {
        if let Err(err) = writer.write(&envelope.topic, &envelope.document).await {
            warn!(event = "event_write_failed", topic = %envelope.topic, error = %err);
        }
    }
    debug!(event = "event_queue_closed");
}

/// Writes events to the log. Used when no message stream is configured.
#[derive(Debug, Default)]
pub struct TracingWriter;

#[async_trait]
impl EventWriter for TracingWriter {
    async fn write(&self, topic: &str, document: &Value) -> Result<(), StoreError> {
        info!(event = "audit_event", topic = %topic, document = %document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventWriter for Recording {
        async fn write(&self, topic: &str, _document: &Value) -> Result<(), StoreError> {
            self.seen.lock().unwrap().push(topic.to_string());
            Ok(())
        }
    }

    struct Blocked {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl EventWriter for Blocked {
        async fn write(&self, _topic: &str, _document: &Value) -> Result<(), StoreError> {
            self.release.notified().await;
            Err(StoreError::Unavailable("sink down".to_string()))
        }
    }

    #[tokio::test]
    async fn drains_everything_on_shutdown() {
        let writer = Arc::new(Recording::default());
        let (sink, handle) = QueuedEventSink::spawn(writer.clone(), 16);
        sink.publish("transactions", json!({"n": 1}));
        sink.publish("file", json!({"n": 2}));
        drop(sink);
        handle.await.unwrap();
        assert_eq!(*writer.seen.lock().unwrap(), vec!["transactions", "file"]);
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let release = Arc::new(Notify::new());
        let writer = Arc::new(Blocked {
            release: release.clone(),
        });
        let (sink, handle) = QueuedEventSink::spawn(writer, 1);

        for n in 0..10 {
            sink.publish("transactions", json!({ "n": n }));
        }
        // The worker holds at most one envelope in flight and one queued.
        assert!(sink.dropped() >= 8, "dropped {}", sink.dropped());

        drop(sink);
        release.notify_one();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
