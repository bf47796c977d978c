pub mod identity;
pub mod provider;
pub mod request;
pub mod response;

pub use identity::Identity;
pub use provider::Transport;
pub use request::{ProviderOperation, ProxyRequestSpec};
pub use response::{ProxyResponse, StreamBody, UpstreamFailure};
