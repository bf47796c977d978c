use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::ledger::ResourceKind;

pub const TRANSACTIONS_TOPIC: &str = "transactions";
pub const FILES_TOPIC: &str = "file";

/// Audit event for one request attempt. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub user: Option<String>,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub success: bool,
    pub transaction_id: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl TransactionRecord {
    pub fn new(
        kind: ResourceKind,
        user: Option<String>,
        transaction_id: impl Into<String>,
        success: bool,
        details: Map<String, Value>,
    ) -> Self {
        Self {
            user,
            date: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            kind,
            success,
            transaction_id: transaction_id.into(),
            details,
        }
    }

    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
