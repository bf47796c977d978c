use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde_json::json;
use tracing::warn;

use chatgate_protocol::retrieval::ScopeId;
use chatgate_storage::ResourceKind;

use crate::audit::Audit;
use crate::core::{CoreState, correlation_id};
use crate::error::GateError;

/// Per-user document sync: `POST` stores the raw body, `GET` reads it back.
pub async fn storage_handler(
    State(state): State<Arc<CoreState>>,
    Path(key): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identity = state.identity.resolve(&headers);
    let mut audit = Audit::begin(
        state.events.clone(),
        ResourceKind::Storage,
        identity.as_ref(),
        correlation_id(&headers),
    );
    audit.note("key", key.clone());
    audit.note("method", method.as_str());

    let Some(identity) = identity else {
        return audit.reject(GateError::LoginRequired(StatusCode::FORBIDDEN)).into_response();
    };
    let key = match ScopeId::parse(&key) {
        Ok(key) => key,
        Err(err) => {
            return audit
                .reject(GateError::BadRequest(format!("invalid storage key: {err}")))
                .into_response();
        }
    };
    let store_key = format!("{}-{}", identity.owner_id(), key);

    if method == Method::POST {
        let quota = state.quotas.peek(Some(&identity), ResourceKind::Storage).await;
        audit.note("quota", quota);
        if quota <= 0 {
            let err = GateError::NoQuota {
                kind: ResourceKind::Storage,
                status: StatusCode::UNAUTHORIZED,
            };
            return audit.reject(err).into_response();
        }
        audit.note("length", body.len());
        let value = match String::from_utf8(body.to_vec()) {
            Ok(value) => value,
            Err(err) => {
                let err = GateError::BadRequest(format!("document is not utf-8: {err}"));
                return audit.reject(err).into_response();
            }
        };
        return match state.store.save(&store_key, value).await {
            Ok(()) => {
                audit.succeed();
                Json(json!({ "result": "OK" })).into_response()
            }
            Err(err) => {
                warn!(event = "storage_write_failed", error = %err);
                audit.reject(GateError::StoreUnavailable(err.to_string())).into_response()
            }
        };
    }

    match state.store.load(&store_key).await {
        Ok(value) => {
            audit.note("found", value.is_some());
            audit.succeed();
            Json(json!({ "result": value })).into_response()
        }
        Err(err) => {
            warn!(event = "storage_read_failed", error = %err);
            audit.reject(GateError::StoreUnavailable(err.to_string())).into_response()
        }
    }
}
