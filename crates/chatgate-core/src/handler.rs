use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Method, StatusCode, Uri};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{info, warn};

use chatgate_protocol::InboundBody;
use chatgate_protocol::openai::list_models::ListModelsResponse;
use chatgate_protocol::retrieval::{RetrievalScope, ScopeId};
use chatgate_provider_core::{Identity, ProviderOperation, ProxyResponse, UpstreamFailure};
use chatgate_provider_impl::{BuildError, InboundCall};
use chatgate_storage::ResourceKind;
use chatgate_transform::list_models::filter::response::transform_response;

use crate::audit::Audit;
use crate::core::{CoreState, correlation_id};
use crate::error::GateError;

pub const FOLDER_HEADER: &str = "folder";
pub const FILE_HEADER: &str = "file";
const MODEL_HEADER: &str = "openai-model";
const MODEL_LIST_LIMIT: usize = 8 * 1024 * 1024;

pub async fn proxy_handler(
    State(state): State<Arc<CoreState>>,
    Path(subpath): Path<String>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return Json(json!({ "body": "OK" })).into_response();
    }

    let correlation_id = correlation_id(&headers);
    let identity = state.identity.resolve(&headers);
    let mut audit = Audit::begin(
        state.events.clone(),
        ResourceKind::Chat,
        identity.as_ref(),
        correlation_id.clone(),
    );
    audit.note("subpath", subpath.clone());

    let request = GatedRequest {
        method,
        subpath,
        query: uri.query().map(str::to_string),
        headers,
        body,
        correlation_id,
        identity,
    };
    match proxy(&state, request, audit).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

struct GatedRequest {
    method: Method,
    subpath: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    correlation_id: String,
    identity: Option<Identity>,
}

async fn proxy(state: &CoreState, request: GatedRequest, mut audit: Audit) -> Result<Response, GateError> {
    let deadline = Instant::now() + state.config.upstream.timeout();
    let identity = request.identity.as_ref();

    let Some(operation) = ProviderOperation::from_subpath(&request.subpath) else {
        info!(event = "forbidden_path", correlation_id = %request.correlation_id, subpath = %request.subpath);
        return Err(audit.reject(GateError::ForbiddenPath(request.subpath)));
    };
    if operation.is_billing() && state.config.features.hide_balance_query {
        return Err(audit.reject(GateError::ForbiddenPath(request.subpath)));
    }

    let quota = state.quotas.peek(identity, ResourceKind::Chat).await;
    audit.note("quota", quota);
    if quota <= 0 {
        // Advisory for chat: flagged on the record, the request proceeds.
        audit.note("quotaExhausted", true);
        warn!(event = "quota_exhausted", correlation_id = %request.correlation_id, kind = %ResourceKind::Chat);
    }

    let grant = match state.access.authorize(&request.headers, identity) {
        Ok(grant) => grant,
        Err(err) => return Err(audit.reject(err)),
    };
    audit.note("system", grant.system);

    let inbound = InboundBody::parse(&request.body);
    if let InboundBody::Opaque { reason, .. } = &inbound {
        warn!(event = "body_unparsed", correlation_id = %request.correlation_id, reason = %reason);
    }
    let premium_allowed = !state.config.features.hide_premium
        && state.quotas.peek(identity, ResourceKind::Premium).await > 0;
    if let Some(model) = inbound.model() {
        audit.note("requestedModel", model);
        if !state.models.allows(model, premium_allowed) {
            return Err(audit.reject(GateError::ModelForbidden(model.to_string())));
        }
    }

    let scope = match retrieval_scope(&request.headers) {
        Ok(scope) => scope,
        Err(err) => return Err(audit.reject(err)),
    };
    audit.note(
        "folder",
        scope.as_ref().map_or(Value::Null, |scope| Value::from(scope.folder.as_str())),
    );
    audit.note("length", request.body.len());

    let call = InboundCall {
        method: request.method.clone(),
        subpath: &request.subpath,
        query: request.query.as_deref(),
        headers: &request.headers,
        body: request.body.clone(),
        correlation_id: &request.correlation_id,
        deadline,
    };
    let built = match &scope {
        Some(scope) => match inbound.as_chat() {
            Some(chat) => state
                .builder
                .retrieval(&call, chat, scope, Some(grant.api_key.clone())),
            None => {
                return Err(audit.reject(GateError::BadRequest(
                    "folder queries need a chat completion body".into(),
                )));
            }
        },
        None => state.builder.direct(&call, &grant.authorization, inbound.model()),
    };
    let spec = match built {
        Ok(spec) => spec,
        Err(err) => return Err(audit.reject(build_error(err))),
    };

    let response = match state.executor.execute(spec, &request.correlation_id).await {
        Ok(response) => response,
        Err(failure) => return Err(audit.reject(GateError::Upstream(failure))),
    };

    let status = response.status;
    audit.note(
        "model",
        response
            .headers
            .get(MODEL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map_or(Value::Null, Value::from),
    );
    audit.note("status", status.as_u16());

    if status.is_success() && state.config.quota.charge_chat && operation.is_chargeable() {
        let charged = match identity {
            Some(identity) => match state.quotas.consume(identity, ResourceKind::Chat).await {
                Ok(_) => true,
                Err(err) => {
                    warn!(event = "quota_charge_failed", correlation_id = %request.correlation_id, error = %err);
                    false
                }
            },
            None => false,
        };
        audit.note("charged", charged);
    }

    if operation == ProviderOperation::ListModels && status == StatusCode::OK && !premium_allowed {
        return match filter_model_list(state, response, premium_allowed).await {
            Ok(response) => {
                audit.note("filtered", true);
                audit.succeed();
                Ok(response)
            }
            Err(err) => Err(audit.reject(err)),
        };
    }

    audit.finish(status.is_success());
    Ok(relay(response))
}

fn retrieval_scope(headers: &HeaderMap) -> Result<Option<RetrievalScope>, GateError> {
    let Some(folder) = header_str(headers, FOLDER_HEADER) else {
        return Ok(None);
    };
    let folder = ScopeId::parse(folder)
        .map_err(|err| GateError::BadRequest(format!("invalid folder: {err}")))?;
    let file = header_str(headers, FILE_HEADER)
        .map(ScopeId::parse)
        .transpose()
        .map_err(|err| GateError::BadRequest(format!("invalid file: {err}")))?;
    Ok(Some(RetrievalScope::new(folder, file)))
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn build_error(err: BuildError) -> GateError {
    if err.is_configuration() {
        GateError::Configuration(err.to_string())
    } else {
        GateError::BadRequest(err.to_string())
    }
}

/// Buffers an upstream model list and drops the entries the caller may not
/// see. Bodies that do not parse are relayed unchanged; a filtered list that
/// cannot be re-encoded is an error, never the unfiltered original.
async fn filter_model_list(
    state: &CoreState,
    response: ProxyResponse,
    premium_allowed: bool,
) -> Result<Response, GateError> {
    let ProxyResponse {
        status,
        mut headers,
        body,
    } = response;
    headers.remove(CONTENT_LENGTH);
    let bytes = body
        .collect(MODEL_LIST_LIMIT)
        .await
        .map_err(|err| GateError::Upstream(UpstreamFailure::Network(err.to_string())))?;
    let body = match serde_json::from_slice::<ListModelsResponse>(&bytes) {
        Ok(list) => {
            let filtered = transform_response(list, |id| state.models.visible(id, premium_allowed));
            serde_json::to_vec(&filtered)
                .map(Bytes::from)
                .map_err(|err| GateError::Internal(format!("model list re-encode failed: {err}")))?
        }
        Err(err) => {
            warn!(event = "model_list_unparsed", error = %err);
            bytes
        }
    };
    let mut out = Response::new(Body::from(body));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    Ok(out)
}

fn relay(response: ProxyResponse) -> Response {
    let mut out = Response::new(Body::from_stream(response.body.stream));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}
