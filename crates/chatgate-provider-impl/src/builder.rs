use bytes::Bytes;
use chatgate_protocol::openai::create_chat_completions::ChatCompletionRequest;
use chatgate_protocol::retrieval::RetrievalScope;
use chatgate_provider_core::ProxyRequestSpec;
use chatgate_transform::TransformError;
use chatgate_transform::invoke::openai2retrieval::request::{RetrievalParams, transform_request};
use http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, HeaderName};
use http::{HeaderMap, HeaderValue, Method};
use tokio::time::Instant;
use url::Url;

use crate::config::{OPENAI_BASE_URL, RetrievalConfig, UpstreamConfig};
use crate::headers::thread_caller_metadata;

const AZURE_KEY_HEADER: &str = "api-key";
const ORGANIZATION_HEADER: &str = "openai-organization";
const SERVICE_TOKEN_HEADER: &str = "x-token";

/// Inbound request as seen by the builder, after the route prefix is gone.
#[derive(Debug, Clone)]
pub struct InboundCall<'a> {
    pub method: Method,
    pub subpath: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub body: Bytes,
    pub correlation_id: &'a str,
    pub deadline: Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing AZURE_API_VERSION in server env vars")]
    MissingAzureApiVersion,
    #[error("azure backend selected but no azure url is configured")]
    MissingAzureUrl,
    #[error("retrieval backend url is not configured")]
    MissingRetrievalUrl,
    #[error("retrieval service token is not configured")]
    MissingServiceToken,
    #[error("invalid upstream url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("credential cannot be sent as a header value")]
    InvalidHeader,
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("failed to encode retrieval body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BuildError {
    /// Server-side misconfiguration, as opposed to a bad inbound request.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingAzureApiVersion
                | Self::MissingAzureUrl
                | Self::MissingRetrievalUrl
                | Self::MissingServiceToken
                | Self::InvalidUrl { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamBuilder {
    upstream: UpstreamConfig,
    retrieval: RetrievalConfig,
}

impl UpstreamBuilder {
    pub fn new(upstream: UpstreamConfig, retrieval: RetrievalConfig) -> Self {
        Self {
            upstream,
            retrieval,
        }
    }

    pub fn upstream(&self) -> &UpstreamConfig {
        &self.upstream
    }

    pub fn base_url(&self) -> Result<String, BuildError> {
        let raw = if self.upstream.is_azure() {
            self.upstream
                .azure
                .url
                .as_deref()
                .or(self.upstream.base_url.as_deref())
                .ok_or(BuildError::MissingAzureUrl)?
        } else {
            self.upstream.base_url.as_deref().unwrap_or(OPENAI_BASE_URL)
        };
        Ok(normalize_base_url(raw))
    }

    /// Direct provider call. `authorization` is the effective `Authorization`
    /// value after access checks; `model` names the Azure deployment when no
    /// fixed deployment is configured.
    pub fn direct(
        &self,
        call: &InboundCall<'_>,
        authorization: &str,
        model: Option<&str>,
    ) -> Result<ProxyRequestSpec, BuildError> {
        let base = self.base_url()?;
        let path = if self.upstream.is_azure() {
            let version = self
                .upstream
                .azure
                .api_version
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .ok_or(BuildError::MissingAzureApiVersion)?;
            let deployment = self.upstream.azure.deployment.as_deref().or(model);
            azure_path(call.subpath, call.query, deployment, version)
        } else {
            match call.query {
                Some(query) if !query.is_empty() => format!("{}?{query}", call.subpath),
                _ => call.subpath.to_string(),
            }
        };
        let url = parse_url(format!("{base}/{path}"))?;

        let mut headers = json_headers();
        if self.upstream.is_azure() {
            let key = authorization.trim();
            let key = key.strip_prefix("Bearer ").unwrap_or(key).trim();
            headers.insert(
                HeaderName::from_static(AZURE_KEY_HEADER),
                header_value(key)?,
            );
        } else {
            headers.insert(AUTHORIZATION, header_value(authorization)?);
        }
        if let Some(org) = self.upstream.org_id.as_deref().filter(|org| !org.is_empty()) {
            headers.insert(HeaderName::from_static(ORGANIZATION_HEADER), header_value(org)?);
        }
        thread_caller_metadata(call.headers, &mut headers, call.correlation_id);

        Ok(ProxyRequestSpec {
            method: call.method.clone(),
            url,
            headers,
            body: call.body.clone(),
            deadline: call.deadline,
        })
    }

    /// Retrieval-augmented call: the chat body is replaced by a fixed-shape
    /// invoke scoped to `scope`.
    pub fn retrieval(
        &self,
        call: &InboundCall<'_>,
        chat: &ChatCompletionRequest,
        scope: &RetrievalScope,
        api_key: Option<String>,
    ) -> Result<ProxyRequestSpec, BuildError> {
        let url = self
            .retrieval
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(BuildError::MissingRetrievalUrl)?;
        let token = self
            .retrieval
            .service_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(BuildError::MissingServiceToken)?;

        let invoke = transform_request(
            chat,
            RetrievalParams {
                model_name: self.retrieval.model.clone(),
                api_key,
                default_temperature: self.retrieval.default_temperature,
            },
            scope,
        )?;
        let body = serde_json::to_vec(&invoke)?;

        let mut headers = json_headers();
        headers.insert(HeaderName::from_static(SERVICE_TOKEN_HEADER), header_value(token)?);
        thread_caller_metadata(call.headers, &mut headers, call.correlation_id);

        Ok(ProxyRequestSpec {
            method: Method::POST,
            url: parse_url(url.to_string())?,
            headers,
            body: Bytes::from(body),
            deadline: call.deadline,
        })
    }
}

/// Adds a scheme when missing and drops trailing slashes.
pub fn normalize_base_url(raw: &str) -> String {
    let raw = raw.trim();
    let with_scheme = if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// Rewrites an OpenAI REST path into the deployment-scoped Azure form.
pub fn azure_path(
    subpath: &str,
    query: Option<&str>,
    deployment: Option<&str>,
    api_version: &str,
) -> String {
    let operation = subpath.strip_prefix("v1/").unwrap_or(subpath);
    let mut path = match deployment.map(str::trim).filter(|d| !d.is_empty()) {
        Some(deployment) => format!(
            "openai/deployments/{}/{operation}",
            urlencoding::encode(deployment)
        ),
        None => format!("openai/{operation}"),
    };
    match query {
        Some(query) if !query.is_empty() => {
            path.push('?');
            path.push_str(query);
            path.push('&');
        }
        _ => path.push('?'),
    }
    path.push_str("api-version=");
    path.push_str(&urlencoding::encode(api_version));
    path
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers
}

fn header_value(raw: &str) -> Result<HeaderValue, BuildError> {
    HeaderValue::from_str(raw).map_err(|_| BuildError::InvalidHeader)
}

fn parse_url(raw: String) -> Result<Url, BuildError> {
    Url::parse(&raw).map_err(|source| BuildError::InvalidUrl { url: raw, source })
}
