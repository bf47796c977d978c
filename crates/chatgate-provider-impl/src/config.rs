use std::time::Duration;

use serde::Deserialize;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_RETRIEVAL_MODEL: &str = "gpt-3.5-turbo-16k";
const DEFAULT_TIMEOUT_SECS: u64 = 10 * 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    OpenAI,
    Azure,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub backend: BackendKind,
    pub base_url: Option<String>,
    pub azure: AzureConfig,
    pub org_id: Option<String>,
    /// Server-side key injected when the caller brings none.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub proxy: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            base_url: None,
            azure: AzureConfig::default(),
            org_id: None,
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            proxy: None,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_azure(&self) -> bool {
        self.backend == BackendKind::Azure
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub url: Option<String>,
    pub api_version: Option<String>,
    /// Fixed deployment; when unset the requested model names the deployment.
    pub deployment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub url: Option<String>,
    pub service_token: Option<String>,
    pub model: String,
    pub default_temperature: Option<f64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_token: None,
            model: DEFAULT_RETRIEVAL_MODEL.to_string(),
            default_temperature: None,
        }
    }
}
