pub mod builder;
pub mod client;
pub mod config;
pub mod executor;
pub mod headers;
pub mod upstream;

pub use builder::{BuildError, InboundCall, UpstreamBuilder};
pub use client::build_client;
pub use config::{AzureConfig, BackendKind, RetrievalConfig, UpstreamConfig};
pub use executor::ProxyExecutor;
pub use headers::{sanitize_response_headers, thread_caller_metadata};
pub use upstream::WreqTransport;
