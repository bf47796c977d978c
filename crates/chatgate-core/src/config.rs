use serde::Deserialize;

use chatgate_provider_impl::{RetrievalConfig, UpstreamConfig};

const DEFAULT_SESSION_COOKIE: &str = "__session";
const DEFAULT_PREMIUM_PREFIX: &str = "gpt-4";
const DEFAULT_UPLOAD_MAX_SIZE: u64 = 20 * 1024 * 1024;
const DEFAULT_UPLOAD_EXPIRES_SECS: u64 = 600;

/// Immutable per-process snapshot the routes read from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub upstream: UpstreamConfig,
    pub retrieval: RetrievalConfig,
    pub access: AccessConfig,
    pub session: SessionConfig,
    pub models: ModelsConfig,
    pub features: FeatureFlags,
    pub quota: QuotaConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub need_code: bool,
    /// Accepted access codes, compared by digest.
    pub codes: Vec<String>,
    pub hide_user_api_key: bool,
    pub require_session: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub jwt_secret: Option<String>,
    pub cookie: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            cookie: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// `+name`, `-name`, `name=Display`, `-all`, `+all`, comma separated.
    pub custom: String,
    pub premium_prefix: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            custom: String::new(),
            premium_prefix: DEFAULT_PREMIUM_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub hide_premium: bool,
    pub hide_balance_query: bool,
    pub disable_fast_link: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Decrement chat quota after each successful upstream response.
    pub charge_chat: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub region: Option<String>,
    /// Region of the image bucket; falls back to `region`.
    pub image_region: Option<String>,
    pub bucket: Option<String>,
    pub image_bucket: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Overrides `https://{bucket}.s3.{region}.amazonaws.com`.
    pub endpoint: Option<String>,
    pub max_size: u64,
    pub expires_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            region: None,
            image_region: None,
            bucket: None,
            image_bucket: None,
            access_key: None,
            secret_key: None,
            endpoint: None,
            max_size: DEFAULT_UPLOAD_MAX_SIZE,
            expires_secs: DEFAULT_UPLOAD_EXPIRES_SECS,
        }
    }
}
