use async_trait::async_trait;

use crate::request::ProxyRequestSpec;
use crate::response::{ProxyResponse, UpstreamFailure};

/// Performs one outbound HTTP exchange. Implementations must not follow
/// redirects and must hand back the body as a stream.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, spec: ProxyRequestSpec) -> Result<ProxyResponse, UpstreamFailure>;
}
