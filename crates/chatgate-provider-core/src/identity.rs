use serde::{Deserialize, Serialize};

/// Authenticated caller, as established by the session layer for one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable unique id (email when the session carries one).
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Id used to scope per-user objects; prefers the subject id.
    pub fn owner_id(&self) -> &str {
        self.subject.as_deref().unwrap_or(&self.id)
    }
}
