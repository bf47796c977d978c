use std::sync::Arc;

use tracing::warn;

use chatgate_provider_core::Identity;
use chatgate_storage::{QuotaKey, QuotaLedger, ResourceKind, StoreError};

/// Ledger access for the routes. Reads fail closed: anonymous callers,
/// missing keys and ledger outages all read as zero.
#[derive(Clone)]
pub struct Quotas {
    ledger: Arc<dyn QuotaLedger>,
}

/// Result of a conditional charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    Taken { remaining: i64 },
    Exhausted,
}

impl Quotas {
    pub fn new(ledger: Arc<dyn QuotaLedger>) -> Self {
        Self { ledger }
    }

    pub async fn peek(&self, identity: Option<&Identity>, kind: ResourceKind) -> i64 {
        let Some(identity) = identity else {
            return 0;
        };
        match self.ledger.get(&QuotaKey::new(identity, kind)).await {
            Ok(units) => units.unwrap_or(0),
            Err(err) => {
                warn!(event = "ledger_read_failed", kind = %kind, error = %err);
                0
            }
        }
    }

    /// Atomic charge used by hard-blocking kinds.
    pub async fn charge(&self, identity: &Identity, kind: ResourceKind) -> Result<Charge, StoreError> {
        let key = QuotaKey::new(identity, kind);
        Ok(match self.ledger.decrement_if_positive(&key).await? {
            Some(remaining) => Charge::Taken { remaining },
            None => Charge::Exhausted,
        })
    }

    /// Unconditional charge used after a chat request was served.
    pub async fn consume(&self, identity: &Identity, kind: ResourceKind) -> Result<i64, StoreError> {
        self.ledger.decrement(&QuotaKey::new(identity, kind)).await
    }
}
