use std::io;

use async_trait::async_trait;
use futures_util::StreamExt;

use chatgate_provider_core::{ProxyRequestSpec, ProxyResponse, StreamBody, Transport, UpstreamFailure};

use crate::client::build_client;
use crate::config::UpstreamConfig;

pub fn network_failure(err: wreq::Error) -> UpstreamFailure {
    if err.is_builder() {
        UpstreamFailure::Request(err.to_string())
    } else {
        UpstreamFailure::Network(err.to_string())
    }
}

/// `Transport` over a shared wreq client. Non-2xx responses are data, not
/// errors: they are relayed with the upstream's own status.
#[derive(Clone)]
pub struct WreqTransport {
    client: wreq::Client,
}

impl WreqTransport {
    pub fn new(client: wreq::Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self, wreq::Error> {
        Ok(Self::new(build_client(config)?))
    }
}

#[async_trait]
impl Transport for WreqTransport {
    async fn send(&self, spec: ProxyRequestSpec) -> Result<ProxyResponse, UpstreamFailure> {
        let mut request = self
            .client
            .request(spec.method, spec.url.as_str())
            .headers(spec.headers);
        if !spec.body.is_empty() {
            request = request.body(spec.body);
        }
        let response = request.send().await.map_err(network_failure)?;

        let status = response.status();
        let headers = response.headers().clone();
        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(|err| io::Error::other(err.to_string())));
        Ok(ProxyResponse {
            status,
            headers,
            body: StreamBody::new(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};
    use httpmock::prelude::*;
    use tokio::time::Instant;
    use url::Url;

    use super::*;

    fn spec(url: String, method: Method, body: &'static [u8]) -> ProxyRequestSpec {
        ProxyRequestSpec {
            method,
            url: Url::parse(&url).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(body),
            deadline: Instant::now() + Duration::from_secs(5),
        }
    }

    fn transport() -> WreqTransport {
        WreqTransport::from_config(&UpstreamConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn redirects_are_passed_through() {
        let server = MockServer::start_async().await;
        let moved = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/models");
                then.status(302).header("location", "https://elsewhere.example/steal");
            })
            .await;

        let response = transport()
            .send(spec(server.url("/v1/models"), Method::GET, b""))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::FOUND);
        assert_eq!(
            response.headers.get("location").unwrap(),
            "https://elsewhere.example/steal"
        );
        moved.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn error_statuses_are_relayed_with_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions").body("{}");
                then.status(429).body(r#"{"error":"slow down"}"#);
            })
            .await;

        let response = transport()
            .send(spec(server.url("/v1/chat/completions"), Method::POST, b"{}"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        let body = response.body.collect(1024).await.unwrap();
        assert_eq!(body, Bytes::from_static(br#"{"error":"slow down"}"#));
    }

    #[tokio::test]
    async fn refused_connection_is_network_failure() {
        let err = transport()
            .send(spec("http://127.0.0.1:1/v1/models".into(), Method::GET, b""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "network");
    }
}
