use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};

use chatgate_protocol::retrieval::ScopeId;
use chatgate_protocol::upload::{UploadGrant, UploadRequest};
use chatgate_provider_core::Identity;
use chatgate_storage::{FILES_TOPIC, ResourceKind};

use crate::audit::Audit;
use crate::core::{CoreState, correlation_id};
use crate::error::GateError;
use crate::presign::PostPolicy;
use crate::quota::Charge;

const UPLOAD_ACL: &str = "public-read";

pub async fn upload_handler(
    State(state): State<Arc<CoreState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identity = state.identity.resolve(&headers);
    let correlation_id = correlation_id(&headers);
    let audit = Audit::begin(
        state.events.clone(),
        ResourceKind::Upload,
        identity.as_ref(),
        correlation_id.clone(),
    );
    match issue(&state, identity, &body, audit, &correlation_id).await {
        Ok(grant) => Json(grant).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn issue(
    state: &CoreState,
    identity: Option<Identity>,
    body: &[u8],
    mut audit: Audit,
    correlation_id: &str,
) -> Result<UploadGrant, GateError> {
    let Some(identity) = identity else {
        return Err(audit.reject(GateError::LoginRequired(StatusCode::UNAUTHORIZED)));
    };
    let request: UploadRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(err) => {
            return Err(audit.reject(GateError::BadRequest(format!("invalid upload request: {err}"))));
        }
    };
    audit.note("fileId", request.file_id.clone());
    audit.note("size", request.size);

    let config = &state.config.upload;
    if request.size > config.max_size {
        let limit_mib = config.max_size / (1024 * 1024);
        return Err(audit.reject(GateError::BadRequest(format!("file size limit is {limit_mib}M"))));
    }
    let file_id = match ScopeId::parse(&request.file_id) {
        Ok(id) => id,
        Err(err) => return Err(audit.reject(GateError::BadRequest(format!("invalid fileId: {err}")))),
    };
    let folder = match request.folder.as_deref().filter(|f| !f.trim().is_empty()).map(ScopeId::parse) {
        None => None,
        Some(Ok(folder)) => Some(folder),
        Some(Err(err)) => return Err(audit.reject(GateError::BadRequest(format!("invalid folder: {err}")))),
    };

    let Some(signer) = &state.signer else {
        return Err(audit.reject(GateError::Configuration("upload is not configured".into())));
    };
    let (bucket, region, key) = match &folder {
        Some(folder) => (
            config.bucket.as_deref(),
            config.region.as_deref(),
            format!("{folder}/{file_id}"),
        ),
        None => (
            config.image_bucket.as_deref(),
            config.image_region.as_deref().or(config.region.as_deref()),
            format!("{}/{file_id}.{}", identity.owner_id(), request.extension()),
        ),
    };
    let (Some(bucket), Some(region)) = (bucket, region) else {
        return Err(audit.reject(GateError::Configuration("upload bucket is not configured".into())));
    };

    let quota = state.quotas.peek(Some(&identity), ResourceKind::Upload).await;
    audit.note("quota", quota);
    if quota <= 0 {
        return Err(audit.reject(no_quota()));
    }

    let policy = PostPolicy {
        bucket,
        region,
        key: &key,
        content_type: &request.content_type,
        max_size: request.size,
        acl: UPLOAD_ACL,
        expires: Duration::from_secs(config.expires_secs),
    };
    let fields = match signer.sign(&policy, OffsetDateTime::now_utc()) {
        Ok(fields) => fields,
        Err(err) => return Err(audit.reject(GateError::Configuration(err.to_string()))),
    };

    // Charged only once a credential exists, and at most once.
    match state.quotas.charge(&identity, ResourceKind::Upload).await {
        Ok(Charge::Taken { remaining }) => audit.note("remaining", remaining),
        Ok(Charge::Exhausted) => return Err(audit.reject(no_quota())),
        Err(err) => {
            warn!(event = "ledger_charge_failed", correlation_id = %correlation_id, error = %err);
            return Err(audit.reject(GateError::LedgerUnavailable(err.to_string())));
        }
    }

    audit.note("key", key.clone());
    audit.note("folder", request.folder.clone());

    state.events.publish(
        FILES_TOPIC,
        json!({
            "user": identity.owner_id(),
            "fileId": request.file_id,
            "index": request.index,
            "folder": request.folder,
            "folderName": request.folder_name,
            "filename": request.filename,
            "size": request.size,
            "contentType": request.content_type,
        }),
    );
    info!(event = "upload_granted", correlation_id = %correlation_id, key = %key);
    audit.succeed();

    let url = match config.endpoint.as_deref().filter(|e| !e.is_empty()) {
        Some(endpoint) => format!("{}/{bucket}", endpoint.trim_end_matches('/')),
        None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
    };
    Ok(UploadGrant { url, fields })
}

fn no_quota() -> GateError {
    GateError::NoQuota {
        kind: ResourceKind::Upload,
        status: StatusCode::FORBIDDEN,
    }
}
