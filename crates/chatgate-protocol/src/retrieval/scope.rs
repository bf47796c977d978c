use std::fmt;

use serde::{Deserialize, Serialize};

const MAX_SCOPE_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeIdError {
    #[error("scope identifier is empty")]
    Empty,
    #[error("scope identifier exceeds {MAX_SCOPE_ID_LEN} characters")]
    TooLong,
    #[error("scope identifier contains forbidden character {0:?}")]
    ForbiddenChar(char),
}

/// Folder or file identifier that is safe to embed in a filter expression
/// or an object key: ASCII alphanumerics plus `-`, `_` and `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeId(String);

impl ScopeId {
    pub fn parse(raw: &str) -> Result<Self, ScopeIdError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ScopeIdError::Empty);
        }
        if raw.len() > MAX_SCOPE_ID_LEN {
            return Err(ScopeIdError::TooLong);
        }
        if let Some(bad) = raw
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')))
        {
            return Err(ScopeIdError::ForbiddenChar(bad));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ScopeId {
    type Error = ScopeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ScopeId> for String {
    fn from(value: ScopeId) -> Self {
        value.0
    }
}

/// Documents a retrieval query may search: one folder, optionally one file in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalScope {
    pub folder: ScopeId,
    pub file: Option<ScopeId>,
}

impl RetrievalScope {
    pub fn new(folder: ScopeId, file: Option<ScopeId>) -> Self {
        Self { folder, file }
    }

    /// Filter expression understood by the retrieval backend's vector store.
    pub fn filter_expr(&self) -> String {
        let mut clauses = vec![eq_clause("folder", &self.folder)];
        if let Some(file) = &self.file {
            clauses.push(eq_clause("file", file));
        }
        clauses.join(" and ")
    }
}

fn eq_clause(field: &str, value: &ScopeId) -> String {
    format!("{field} == '{}'", value.as_str())
}
