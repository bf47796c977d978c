use std::fmt;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};
use http::{HeaderMap, StatusCode};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

pub struct StreamBody {
    pub stream: ByteStream,
}

impl StreamBody {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::new(stream::once(async move { Ok(bytes) }))
    }

    pub fn empty() -> Self {
        Self::new(stream::empty())
    }

    /// Buffers the whole body, failing once more than `limit` bytes arrive.
    pub async fn collect(mut self, limit: usize) -> Result<Bytes, io::Error> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.stream.next().await {
            let chunk = chunk?;
            if buf.len() + chunk.len() > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("upstream body exceeds {limit} bytes"),
                ));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: StreamBody,
}

/// Failure before any upstream response head was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamFailure {
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
    #[error("upstream connection failed: {0}")]
    Network(String),
    #[error("upstream request rejected before sending: {0}")]
    Request(String),
}

impl UpstreamFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::Request(_) => "request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::Request(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
