use std::time::Duration;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::ledger::{QuotaKey, QuotaLedger};
use crate::store::{StoreError, UserStore};

const KV_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns the post-decrement value, or -1 when the key held nothing positive.
const DECR_IF_POSITIVE: &str = "local v = tonumber(redis.call('GET', KEYS[1]) or '0') \
if v ~= nil and v > 0 then return redis.call('DECR', KEYS[1]) end \
return -1";

/// Redis-over-REST key-value store: every command is a JSON array POSTed to
/// the base URL, answered with `{"result": ...}` or `{"error": ...}`.
#[derive(Clone)]
pub struct RestKv {
    client: wreq::Client,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl RestKv {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self, StoreError> {
        let client = wreq::Client::builder()
            .timeout(KV_TIMEOUT)
            .build()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn command(&self, args: Value) -> Result<Value, StoreError> {
        let response = self
            .client
            .post(self.url.as_str())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&args)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let status = response.status();
        let reply: Reply = response
            .json()
            .await
            .map_err(|err| StoreError::Decode(err.to_string()))?;
        if let Some(error) = reply.error {
            return Err(StoreError::Rejected(error));
        }
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!("status {}", status.as_u16())));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }
}

fn as_units(value: &Value) -> Result<Option<i64>, StoreError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| StoreError::Decode(format!("non-integer quota {number}"))),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| StoreError::Decode(format!("non-integer quota {text:?}"))),
        other => Err(StoreError::Decode(format!("unexpected quota value {other}"))),
    }
}

#[async_trait]
impl QuotaLedger for RestKv {
    async fn get(&self, key: &QuotaKey) -> Result<Option<i64>, StoreError> {
        let value = self.command(json!(["GET", key.as_str()])).await?;
        as_units(&value)
    }

    async fn decrement(&self, key: &QuotaKey) -> Result<i64, StoreError> {
        let value = self.command(json!(["DECR", key.as_str()])).await?;
        as_units(&value)?.ok_or_else(|| StoreError::Decode("DECR returned null".to_string()))
    }

    async fn decrement_if_positive(&self, key: &QuotaKey) -> Result<Option<i64>, StoreError> {
        let value = self
            .command(json!(["EVAL", DECR_IF_POSITIVE, 1, key.as_str()]))
            .await?;
        match as_units(&value)? {
            Some(remaining) if remaining >= 0 => Ok(Some(remaining)),
            Some(_) => Ok(None),
            None => {
                warn!(event = "kv_unexpected_reply", key = %key, "conditional decrement returned null");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl UserStore for RestKv {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.command(json!(["GET", key])).await? {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text)),
            other => Ok(Some(other.to_string())),
        }
    }

    async fn save(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.command(json!(["SET", key, value])).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chatgate_provider_core::Identity;
    use httpmock::prelude::*;

    use super::*;
    use crate::ledger::ResourceKind;

    const TOKEN: &str = "kv-token";

    fn key() -> QuotaKey {
        QuotaKey::new(&Identity::new("ann@example.com"), ResourceKind::Upload)
    }

    /// A server whose conditional decrement answers `reply`.
    async fn eval_answering(reply: Value) -> (MockServer, RestKv) {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .header("authorization", "Bearer kv-token")
                    .body_includes("\"EVAL\"")
                    .body_includes(key().as_str());
                then.status(200).json_body(reply.clone());
            })
            .await;
        let kv = RestKv::new(server.base_url(), TOKEN).unwrap();
        (server, kv)
    }

    #[tokio::test]
    async fn reads_and_decrements_over_rest() {
        let server = MockServer::start_async().await;
        let read = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .header("authorization", "Bearer kv-token")
                    .json_body(json!(["GET", key().as_str()]));
                then.status(200).json_body(json!({ "result": "4" }));
            })
            .await;
        let decr = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .json_body(json!(["DECR", key().as_str()]));
                then.status(200).json_body(json!({ "result": 3 }));
            })
            .await;
        let kv = RestKv::new(format!("{}/", server.base_url()), TOKEN).unwrap();

        assert_eq!(kv.get(&key()).await.unwrap(), Some(4));
        assert_eq!(kv.decrement(&key()).await.unwrap(), 3);
        read.assert_async().await;
        decr.assert_async().await;
    }

    #[tokio::test]
    async fn conditional_decrement_maps_script_reply() {
        let (_server, kv) = eval_answering(json!({ "result": 2 })).await;
        assert_eq!(kv.decrement_if_positive(&key()).await.unwrap(), Some(2));

        let (_server, kv) = eval_answering(json!({ "result": -1 })).await;
        assert_eq!(kv.decrement_if_positive(&key()).await.unwrap(), None);

        let (_server, kv) = eval_answering(json!({ "result": null })).await;
        assert_eq!(kv.decrement_if_positive(&key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn error_reply_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(400)
                    .json_body(json!({ "error": "ERR value is not an integer" }));
            })
            .await;
        let kv = RestKv::new(server.base_url(), TOKEN).unwrap();

        let err = kv.decrement(&key()).await.unwrap_err();
        assert_eq!(err, StoreError::Rejected("ERR value is not an integer".into()));
    }

    #[tokio::test]
    async fn missing_document_loads_as_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/").json_body(json!(["GET", "sub-1-chat"]));
                then.status(200).json_body(json!({ "result": null }));
            })
            .await;
        let kv = RestKv::new(server.base_url(), TOKEN).unwrap();

        assert_eq!(kv.load("sub-1-chat").await.unwrap(), None);
    }

    #[test]
    fn quota_values_accept_strings_and_numbers() {
        assert_eq!(as_units(&json!(null)).unwrap(), None);
        assert_eq!(as_units(&json!(7)).unwrap(), Some(7));
        assert_eq!(as_units(&json!(" -2 ")).unwrap(), Some(-2));
        assert!(as_units(&json!("lots")).is_err());
        assert!(as_units(&json!([1])).is_err());
    }
}
