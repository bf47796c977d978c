use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use chatgate_provider_core::Identity;

use crate::store::StoreError;

/// Billing/quota category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Chat,
    Premium,
    Upload,
    Storage,
}

/// What an exhausted quota does to a request of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    /// Recorded in the audit trail, request still served.
    Advisory,
    /// Request rejected before any side effect.
    Blocking,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Premium => "premium",
            Self::Upload => "upload",
            Self::Storage => "storage",
        }
    }

    pub fn enforcement(self) -> Enforcement {
        match self {
            Self::Chat | Self::Premium => Enforcement::Advisory,
            Self::Upload | Self::Storage => Enforcement::Blocking,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger key: `base64(identity id) + ":" + kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey(String);

impl QuotaKey {
    pub fn new(identity: &Identity, kind: ResourceKind) -> Self {
        Self(format!("{}:{}", STANDARD.encode(identity.id.as_bytes()), kind))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuotaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Current remaining units, `None` when the key was never written.
    async fn get(&self, key: &QuotaKey) -> Result<Option<i64>, StoreError>;

    /// Unconditional decrement; returns the post-decrement value.
    async fn decrement(&self, key: &QuotaKey) -> Result<i64, StoreError>;

    /// Decrements only while the value is positive. `None` means nothing was
    /// left to take.
    async fn decrement_if_positive(&self, key: &QuotaKey) -> Result<Option<i64>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: DashMap<String, i64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &QuotaKey, units: i64) {
        self.entries.insert(key.as_str().to_string(), units);
    }

    pub fn with_units(self, identity: &Identity, kind: ResourceKind, units: i64) -> Self {
        self.set(&QuotaKey::new(identity, kind), units);
        self
    }
}

#[async_trait]
impl QuotaLedger for MemoryLedger {
    async fn get(&self, key: &QuotaKey) -> Result<Option<i64>, StoreError> {
        Ok(self.entries.get(key.as_str()).map(|entry| *entry))
    }

    async fn decrement(&self, key: &QuotaKey) -> Result<i64, StoreError> {
        let mut entry = self.entries.entry(key.as_str().to_string()).or_insert(0);
        *entry -= 1;
        Ok(*entry)
    }

    async fn decrement_if_positive(&self, key: &QuotaKey) -> Result<Option<i64>, StoreError> {
        let Some(mut entry) = self.entries.get_mut(key.as_str()) else {
            return Ok(None);
        };
        if *entry <= 0 {
            return Ok(None);
        }
        *entry -= 1;
        Ok(Some(*entry))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn key_matches_stream_consumer_format() {
        let identity = Identity::new("ann@example.com");
        let key = QuotaKey::new(&identity, ResourceKind::Chat);
        assert_eq!(key.as_str(), "YW5uQGV4YW1wbGUuY29t:chat");
    }

    #[test]
    fn enforcement_per_kind() {
        assert_eq!(ResourceKind::Chat.enforcement(), Enforcement::Advisory);
        assert_eq!(ResourceKind::Premium.enforcement(), Enforcement::Advisory);
        assert_eq!(ResourceKind::Upload.enforcement(), Enforcement::Blocking);
        assert_eq!(ResourceKind::Storage.enforcement(), Enforcement::Blocking);
    }

    #[tokio::test]
    async fn decrement_if_positive_never_goes_negative() {
        let identity = Identity::new("u");
        let key = QuotaKey::new(&identity, ResourceKind::Upload);
        let ledger = MemoryLedger::new().with_units(&identity, ResourceKind::Upload, 1);

        assert_eq!(ledger.decrement_if_positive(&key).await.unwrap(), Some(0));
        assert_eq!(ledger.decrement_if_positive(&key).await.unwrap(), None);
        assert_eq!(ledger.get(&key).await.unwrap(), Some(0));

        let missing = QuotaKey::new(&Identity::new("nobody"), ResourceKind::Upload);
        assert_eq!(ledger.decrement_if_positive(&missing).await.unwrap(), None);
        assert_eq!(ledger.get(&missing).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_conditional_decrements_stop_at_zero() {
        let identity = Identity::new("racer");
        let key = QuotaKey::new(&identity, ResourceKind::Upload);
        let ledger = Arc::new(MemoryLedger::new().with_units(&identity, ResourceKind::Upload, 5));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                ledger.decrement_if_positive(&key).await.unwrap()
            }));
        }
        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap().is_some() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
        assert_eq!(ledger.get(&key).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn plain_decrement_can_overspend() {
        let identity = Identity::new("u");
        let key = QuotaKey::new(&identity, ResourceKind::Chat);
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.decrement(&key).await.unwrap(), -1);
    }
}
