use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use http::HeaderMap;
use tracing::warn;
use uuid::Uuid;

use chatgate_provider_core::Transport;
use chatgate_provider_impl::{ProxyExecutor, UpstreamBuilder, headers::TRANSACTION_ID_HEADER};
use chatgate_storage::{EventSink, QuotaLedger, UserStore};

use crate::auth::{AccessPolicy, IdentityResolver};
use crate::client_config::client_config_handler;
use crate::config::GateConfig;
use crate::handler::proxy_handler;
use crate::health::health_handler;
use crate::policy::ModelAccess;
use crate::presign::PostPolicySigner;
use crate::quota::Quotas;
use crate::storage_route::storage_handler;
use crate::upload::upload_handler;

const BODY_LIMIT: usize = 32 * 1024 * 1024;

/// External systems the gate talks to, built once per process by the caller.
pub struct Collaborators {
    pub identity: Arc<dyn IdentityResolver>,
    pub ledger: Arc<dyn QuotaLedger>,
    pub store: Arc<dyn UserStore>,
    pub events: Arc<dyn EventSink>,
    pub transport: Arc<dyn Transport>,
}

pub struct CoreState {
    pub config: GateConfig,
    pub identity: Arc<dyn IdentityResolver>,
    pub quotas: Quotas,
    pub store: Arc<dyn UserStore>,
    pub events: Arc<dyn EventSink>,
    pub executor: ProxyExecutor,
    pub builder: UpstreamBuilder,
    pub access: AccessPolicy,
    pub models: ModelAccess,
    /// `None` when upload credentials are not configured.
    pub signer: Option<PostPolicySigner>,
}

pub struct Core {
    state: Arc<CoreState>,
}

impl Core {
    pub fn new(config: GateConfig, collaborators: Collaborators) -> Self {
        let signer = match (&config.upload.access_key, &config.upload.secret_key) {
            (Some(access), Some(secret)) => match PostPolicySigner::new(access.clone(), secret.clone()) {
                Ok(signer) => Some(signer),
                Err(err) => {
                    warn!(event = "upload_disabled", error = %err);
                    None
                }
            },
            _ => None,
        };
        let state = CoreState {
            identity: collaborators.identity,
            quotas: Quotas::new(collaborators.ledger),
            store: collaborators.store,
            events: collaborators.events,
            executor: ProxyExecutor::new(collaborators.transport),
            builder: UpstreamBuilder::new(config.upstream.clone(), config.retrieval.clone()),
            access: AccessPolicy::new(config.access.clone(), config.upstream.api_key.clone()),
            models: ModelAccess::new(&config.models),
            signer,
            config,
        };
        Self {
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/openai/{*path}", any(proxy_handler))
            .route("/api/config", get(client_config_handler).post(client_config_handler))
            .route("/api/upload", axum::routing::post(upload_handler))
            .route("/api/storage/{key}", get(storage_handler).post(storage_handler))
            .route("/healthz", get(health_handler))
            .layer(DefaultBodyLimit::max(BODY_LIMIT))
            .with_state(self.state.clone())
    }

    pub fn state(&self) -> Arc<CoreState> {
        self.state.clone()
    }
}

/// Caller supplied `X-Transaction-Id`, or a fresh one.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(TRANSACTION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
