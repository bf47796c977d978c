use bytes::Bytes;
use http::{HeaderMap, Method};
use tokio::time::Instant;
use url::Url;

/// Upstream operations the proxy is willing to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOperation {
    ChatCompletions,
    Embeddings,
    ListModels,
    BillingUsage,
    BillingSubscription,
}

impl ProviderOperation {
    pub const ALL: [ProviderOperation; 5] = [
        Self::ChatCompletions,
        Self::Embeddings,
        Self::ListModels,
        Self::BillingUsage,
        Self::BillingSubscription,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Self::ChatCompletions => "v1/chat/completions",
            Self::Embeddings => "v1/embeddings",
            Self::ListModels => "v1/models",
            Self::BillingUsage => "dashboard/billing/usage",
            Self::BillingSubscription => "dashboard/billing/subscription",
        }
    }

    /// Exact match against the allow-list; no prefix or normalization tricks.
    pub fn from_subpath(subpath: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.path() == subpath)
    }

    pub fn is_billing(self) -> bool {
        matches!(self, Self::BillingUsage | Self::BillingSubscription)
    }

    pub fn is_chargeable(self) -> bool {
        matches!(self, Self::ChatCompletions | Self::Embeddings)
    }
}

/// Fully resolved outbound call.
#[derive(Debug, Clone)]
pub struct ProxyRequestSpec {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub deadline: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_is_exact() {
        assert_eq!(
            ProviderOperation::from_subpath("v1/chat/completions"),
            Some(ProviderOperation::ChatCompletions)
        );
        assert_eq!(ProviderOperation::from_subpath("v1/chat/completions/"), None);
        assert_eq!(ProviderOperation::from_subpath("v1/files"), None);
        assert_eq!(ProviderOperation::from_subpath("../v1/models"), None);
        assert_eq!(ProviderOperation::from_subpath(""), None);
    }
}
