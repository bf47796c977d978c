use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ModelsConfig;

/// Built-in catalog, every entry available.
pub const DEFAULT_MODELS: &[&str] = &[
    "gpt-4",
    "gpt-4-0314",
    "gpt-4-0613",
    "gpt-4-32k",
    "gpt-4-32k-0314",
    "gpt-4-32k-0613",
    "gpt-4-1106-preview",
    "gpt-4-vision-preview",
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-0301",
    "gpt-3.5-turbo-0613",
    "gpt-3.5-turbo-1106",
    "gpt-3.5-turbo-16k",
    "gpt-3.5-turbo-16k-0613",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    OpenAI,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub display_name: String,
    pub provider: ModelProvider,
    pub available: bool,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, available: bool) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            provider: ModelProvider::OpenAI,
            available,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl ModelCatalog {
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.id.clone(), entry))
                .collect(),
        }
    }

    pub fn defaults() -> Self {
        Self::from_entries(DEFAULT_MODELS.iter().map(|id| CatalogEntry::new(*id, true)))
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// Unknown models are allowed; only known-and-disabled ones are refused.
    pub fn allows(&self, id: &str) -> bool {
        self.entries.get(id).is_none_or(|entry| entry.available)
    }

    pub fn disable_prefixed(&mut self, prefix: &str) {
        for entry in self.entries.values_mut() {
            if entry.id.starts_with(prefix) {
                entry.available = false;
            }
        }
    }

    /// Applies the comma separated override grammar in order. An override
    /// keeps the provider of the entry it replaces.
    pub fn apply_overrides(&mut self, grammar: &str) {
        for raw in grammar.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let available = !raw.starts_with('-');
            let spec = raw
                .strip_prefix('+')
                .or_else(|| raw.strip_prefix('-'))
                .unwrap_or(raw);
            let (name, display) = match spec.split_once('=') {
                Some((name, display)) => (name.trim(), Some(display.trim())),
                None => (spec.trim(), None),
            };
            if name.is_empty() {
                continue;
            }
            if name == "all" {
                for entry in self.entries.values_mut() {
                    entry.available = available;
                }
                continue;
            }
            let provider = self
                .entries
                .get(name)
                .map_or(ModelProvider::OpenAI, |entry| entry.provider);
            let display_name = display.filter(|d| !d.is_empty()).unwrap_or(name);
            self.entries.insert(
                name.to_string(),
                CatalogEntry {
                    id: name.to_string(),
                    display_name: display_name.to_string(),
                    provider,
                    available,
                },
            );
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }
}

/// Decides which models a caller may name in a request.
#[derive(Debug, Clone)]
pub struct ModelAccess {
    base: ModelCatalog,
    custom: String,
    premium_prefix: String,
}

impl ModelAccess {
    pub fn new(config: &ModelsConfig) -> Self {
        Self::with_base(ModelCatalog::defaults(), config)
    }

    pub fn with_base(base: ModelCatalog, config: &ModelsConfig) -> Self {
        Self {
            base,
            custom: config.custom.clone(),
            premium_prefix: config.premium_prefix.clone(),
        }
    }

    pub fn is_premium(&self, id: &str) -> bool {
        !self.premium_prefix.is_empty() && id.starts_with(&self.premium_prefix)
    }

    /// Defaults, then premium tier switched off when not allowed, then tenant
    /// overrides so an explicit re-enable wins.
    pub fn catalog(&self, premium_allowed: bool) -> ModelCatalog {
        let mut catalog = self.base.clone();
        if !premium_allowed && !self.premium_prefix.is_empty() {
            catalog.disable_prefixed(&self.premium_prefix);
        }
        catalog.apply_overrides(&self.custom);
        catalog
    }

    pub fn allows(&self, model: &str, premium_allowed: bool) -> bool {
        self.catalog(premium_allowed).allows(model)
    }

    /// Model list entries the caller should see: premium entries are hidden
    /// unless premium is allowed or an override re-enabled them.
    pub fn visible(&self, id: &str, premium_allowed: bool) -> bool {
        if premium_allowed || !self.is_premium(id) {
            return true;
        }
        self.catalog(false).get(id).is_some_and(|entry| entry.available)
    }

    /// Override string for clients that apply the grammar themselves.
    pub fn client_custom_models(&self, premium_allowed: bool) -> String {
        let mut items: Vec<String> = Vec::new();
        if !premium_allowed && !self.premium_prefix.is_empty() {
            items.extend(
                self.base
                    .entries()
                    .filter(|entry| entry.id.starts_with(&self.premium_prefix))
                    .map(|entry| format!("-{}", entry.id)),
            );
        }
        if !self.custom.trim().is_empty() {
            items.push(self.custom.trim().to_string());
        }
        items.join(",")
    }
}
