use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::AUTHORIZATION;
use serde_json::{Value, json};

use crate::bus::EventWriter;
use crate::store::StoreError;

const PRODUCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces documents to a message stream exposed over REST
/// (`POST {url}/produce` with basic auth).
#[derive(Clone)]
pub struct RestStreamWriter {
    client: wreq::Client,
    url: String,
    authorization: String,
}

impl RestStreamWriter {
    pub fn new(
        url: impl Into<String>,
        username: &str,
        password: &str,
    ) -> Result<Self, StoreError> {
        let client = wreq::Client::builder()
            .timeout(PRODUCE_TIMEOUT)
            .build()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let credentials = STANDARD.encode(format!("{username}:{password}"));
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            authorization: format!("Basic {credentials}"),
        })
    }
}

#[async_trait]
impl EventWriter for RestStreamWriter {
    async fn write(&self, topic: &str, document: &Value) -> Result<(), StoreError> {
        let payload = json!({
            "topic": topic,
            "value": document.to_string(),
        });
        let response = self
            .client
            .post(format!("{}/produce", self.url))
            .header(AUTHORIZATION, self.authorization.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Rejected(format!(
                "produce to {topic} answered {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}
