use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected command: {0}")]
    Rejected(String),
    #[error("unexpected store reply: {0}")]
    Decode(String),
}

/// Per-user key-value documents.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn save(&self, key: &str, value: String) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    async fn save(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}
