use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::debug;

use chatgate_provider_core::Identity;
use chatgate_storage::{EventSink, ResourceKind, TRANSACTIONS_TOPIC, TransactionRecord};

use crate::error::GateError;

/// Pending transaction record for one request. Finishing consumes the guard,
/// so a request can publish at most once; a guard dropped unfinished (the
/// client went away mid-request) publishes a `CANCELLED` failure instead.
pub struct Audit {
    sink: Arc<dyn EventSink>,
    kind: ResourceKind,
    user: Option<String>,
    correlation_id: String,
    details: Map<String, Value>,
    finished: bool,
}

impl Audit {
    pub fn begin(
        sink: Arc<dyn EventSink>,
        kind: ResourceKind,
        identity: Option<&Identity>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            kind,
            user: identity.map(|identity| identity.id.clone()),
            correlation_id: correlation_id.into(),
            details: Map::new(),
            finished: false,
        }
    }

    pub fn note(&mut self, key: &str, value: impl Into<Value>) {
        self.details.insert(key.to_string(), value.into());
    }

    pub fn succeed(self) {
        self.finish(true);
    }

    pub fn finish(mut self, success: bool) {
        self.publish(success);
    }

    /// Records `err` and returns it, so rejections read `return Err(audit.reject(err))`.
    pub fn reject(mut self, err: GateError) -> GateError {
        self.note("error", json!({ "message": err.code(), "detail": err.to_string() }));
        self.publish(false);
        err
    }

    fn publish(&mut self, success: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        let record = TransactionRecord::new(
            self.kind,
            self.user.clone(),
            self.correlation_id.clone(),
            success,
            std::mem::take(&mut self.details),
        );
        debug!(
            event = "transaction",
            correlation_id = %self.correlation_id,
            kind = %self.kind,
            success,
        );
        self.sink.publish(TRANSACTIONS_TOPIC, record.to_document());
    }
}

impl Drop for Audit {
    fn drop(&mut self) {
        if !self.finished {
            self.note("error", json!({ "message": "CANCELLED" }));
            self.publish(false);
        }
    }
}
