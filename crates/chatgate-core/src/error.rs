use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde_json::json;

use chatgate_provider_core::UpstreamFailure;
use chatgate_storage::ResourceKind;

/// Every way a gated request can end without relaying an upstream response.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("you are not allowed to request {0}")]
    ForbiddenPath(String),
    #[error("no {kind} quota left")]
    NoQuota { kind: ResourceKind, status: StatusCode },
    #[error("{0}")]
    Auth(String),
    #[error("Access denied! Please login first")]
    LoginRequired(StatusCode),
    #[error("you are not allowed to use {0} model")]
    ModelForbidden(String),
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamFailure),
    #[error("quota ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("user store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Stable code written into the audit record.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ForbiddenPath(_) => "FORBIDDEN_PATH",
            Self::NoQuota { .. } => "NO_QUOTA",
            Self::Auth(_) | Self::LoginRequired(_) => "AUTH_ERROR",
            Self::ModelForbidden(_) => "MODEL_FORBIDDEN",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Upstream(_) => "UPSTREAM_FAILURE",
            Self::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ForbiddenPath(_) | Self::ModelForbidden(_) => StatusCode::FORBIDDEN,
            Self::NoQuota { status, .. } | Self::LoginRequired(status) => *status,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            // The client reads configuration problems out of the body.
            Self::Configuration(_) => StatusCode::OK,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(failure) => failure.status(),
            Self::LedgerUnavailable(_) | Self::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        match &self {
            Self::ModelForbidden(_) | Self::Configuration(_) => {
                (status, Json(json!({ "error": true, "message": message }))).into_response()
            }
            Self::Upstream(failure) => {
                let body = json!({
                    "error": true,
                    "kind": failure.kind(),
                    "message": message,
                });
                let pretty = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
                (status, [(CONTENT_TYPE, "application/json")], pretty).into_response()
            }
            _ => (status, Json(json!({ "error": true, "msg": message }))).into_response(),
        }
    }
}
