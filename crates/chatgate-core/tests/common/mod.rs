#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue};
use serde_json::Value;
use tower::ServiceExt;

use chatgate_core::{Collaborators, Core, GateConfig, IdentityResolver};
use chatgate_provider_core::{
    Identity, ProxyRequestSpec, ProxyResponse, StreamBody, Transport, UpstreamFailure,
};
use chatgate_storage::{
    MemoryEventSink, MemoryLedger, MemoryStore, QuotaKey, QuotaLedger, ResourceKind, StoreError,
    TRANSACTIONS_TOPIC,
};

pub const USER_HEADER: &str = "x-test-user";
pub const ANN: &str = "ann@example.com";

/// Trusts a plain header as the session; stands in for the JWT resolver.
pub struct HeaderIdentity;

impl IdentityResolver for HeaderIdentity {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|id| Identity::new(id).with_subject(format!("sub-{id}")))
    }
}

#[derive(Clone)]
pub enum Upstream {
    Respond {
        status: StatusCode,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    },
    Hang,
    Refuse,
}

impl Upstream {
    pub fn ok(body: &'static str) -> Self {
        Self::Respond {
            status: StatusCode::OK,
            headers: vec![("content-type", "application/json")],
            body,
        }
    }
}

/// Stub upstream that counts calls and keeps the last request it saw.
pub struct CountingTransport {
    behaviour: Upstream,
    calls: AtomicUsize,
    last: Mutex<Option<ProxyRequestSpec>>,
}

impl CountingTransport {
    pub fn new(behaviour: Upstream) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<ProxyRequestSpec> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for CountingTransport {
    async fn send(&self, spec: ProxyRequestSpec) -> Result<ProxyResponse, UpstreamFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(spec);
        match &self.behaviour {
            Upstream::Respond {
                status,
                headers,
                body,
            } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.append(*name, HeaderValue::from_static(value));
                }
                Ok(ProxyResponse {
                    status: *status,
                    headers: map,
                    body: StreamBody::from_bytes(Bytes::from_static(body.as_bytes())),
                })
            }
            Upstream::Hang => std::future::pending().await,
            Upstream::Refuse => Err(UpstreamFailure::Network("connection refused".into())),
        }
    }
}

/// How a `ScriptedLedger` answers the conditional decrement.
#[derive(Clone, Copy)]
pub enum ChargeOutcome {
    /// Another request took the last unit between read and charge.
    LostRace,
    Down,
}

/// Reads a fixed positive balance but fails the conditional charge.
pub struct ScriptedLedger {
    pub units: i64,
    pub charge: ChargeOutcome,
}

#[async_trait]
impl QuotaLedger for ScriptedLedger {
    async fn get(&self, _key: &QuotaKey) -> Result<Option<i64>, StoreError> {
        Ok(Some(self.units))
    }

    async fn decrement(&self, _key: &QuotaKey) -> Result<i64, StoreError> {
        Ok(self.units - 1)
    }

    async fn decrement_if_positive(&self, _key: &QuotaKey) -> Result<Option<i64>, StoreError> {
        match self.charge {
            ChargeOutcome::LostRace => Ok(None),
            ChargeOutcome::Down => Err(StoreError::Unavailable("connection reset".into())),
        }
    }
}

pub fn base_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.upstream.api_key = Some("sk-server".into());
    config
}

pub struct Harness {
    pub router: Router,
    pub transport: Arc<CountingTransport>,
    pub ledger: Arc<MemoryLedger>,
    pub events: Arc<MemoryEventSink>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new(config: GateConfig, upstream: Upstream) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        Self::build(config, upstream, ledger.clone(), ledger)
    }

    /// Routes quota calls to `quota` instead of the in-memory ledger.
    pub fn with_ledger(config: GateConfig, upstream: Upstream, quota: Arc<dyn QuotaLedger>) -> Self {
        Self::build(config, upstream, quota, Arc::new(MemoryLedger::new()))
    }

    fn build(
        config: GateConfig,
        upstream: Upstream,
        quota: Arc<dyn QuotaLedger>,
        ledger: Arc<MemoryLedger>,
    ) -> Self {
        let transport = CountingTransport::new(upstream);
        let events = Arc::new(MemoryEventSink::new());
        let store = Arc::new(MemoryStore::new());
        let core = Core::new(
            config,
            Collaborators {
                identity: Arc::new(HeaderIdentity),
                ledger: quota,
                store: store.clone(),
                events: events.clone(),
                transport: transport.clone(),
            },
        );
        Self {
            router: core.router(),
            transport,
            ledger,
            events,
            store,
        }
    }

    pub fn grant(&self, user: &str, kind: ResourceKind, units: i64) {
        self.ledger.set(&QuotaKey::new(&Identity::new(user), kind), units);
    }

    pub fn transactions(&self) -> Vec<Value> {
        self.events.topic(TRANSACTIONS_TOPIC)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }
}

pub fn json(bytes: &Bytes) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

pub fn chat_request(user: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/openai/v1/chat/completions")
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
