use std::time::Duration;

use crate::config::UpstreamConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared upstream client. Redirects are handed back to the caller untouched
/// so a credential-bearing request is never replayed to another host.
pub fn build_client(config: &UpstreamConfig) -> Result<wreq::Client, wreq::Error> {
    let mut builder = wreq::Client::builder()
        .redirect(wreq::redirect::Policy::none())
        .connect_timeout(CONNECT_TIMEOUT);
    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        builder = builder.proxy(wreq::Proxy::all(proxy)?);
    }
    builder.build()
}
