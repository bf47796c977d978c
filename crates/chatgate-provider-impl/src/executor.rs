use std::io;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

use chatgate_provider_core::{ProxyRequestSpec, ProxyResponse, StreamBody, Transport, UpstreamFailure};

use crate::headers::sanitize_response_headers;

/// Runs one upstream call under the request's deadline. The deadline covers the
/// whole exchange: once it passes, an in-flight send or body stream is
/// dropped, which closes the connection.
#[derive(Clone)]
pub struct ProxyExecutor {
    transport: Arc<dyn Transport>,
}

impl ProxyExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn execute(
        &self,
        spec: ProxyRequestSpec,
        correlation_id: &str,
    ) -> Result<ProxyResponse, UpstreamFailure> {
        let started = Instant::now();
        let deadline = spec.deadline;
        let budget = deadline.saturating_duration_since(started);

        info!(
            event = "upstream_request",
            correlation_id = %correlation_id,
            method = %spec.method,
            host = spec.url.host_str().unwrap_or_default(),
            path = spec.url.path(),
            budget_ms = budget.as_millis() as u64,
        );

        let outcome = timeout_at(deadline, self.transport.send(spec)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mut response = match outcome {
            Err(_) => {
                warn!(
                    event = "upstream_timeout",
                    correlation_id = %correlation_id,
                    elapsed_ms,
                );
                return Err(UpstreamFailure::Timeout(budget));
            }
            Ok(Err(failure)) => {
                warn!(
                    event = "upstream_failure",
                    correlation_id = %correlation_id,
                    kind = failure.kind(),
                    error = %failure,
                    elapsed_ms,
                );
                return Err(failure);
            }
            Ok(Ok(response)) => response,
        };

        info!(
            event = "upstream_response",
            correlation_id = %correlation_id,
            status = response.status.as_u16(),
            elapsed_ms,
        );

        sanitize_response_headers(&mut response.headers);
        response.body = bounded_by(response.body, deadline);
        Ok(response)
    }
}

fn bounded_by(body: StreamBody, deadline: Instant) -> StreamBody {
    let mut inner = body.stream;
    StreamBody::new(async_stream::stream! {
        loop {
            match timeout_at(deadline, inner.next()).await {
                Ok(Some(item)) => yield item,
                Ok(None) => break,
                Err(_) => {
                    yield Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "upstream body exceeded deadline",
                    ));
                    break;
                }
            }
        }
    })
}
