use http::header::{
    CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, HeaderName, PROXY_AUTHENTICATE, TE, TRAILER,
    TRANSFER_ENCODING, UPGRADE, USER_AGENT, WWW_AUTHENTICATE,
};
use http::{HeaderMap, HeaderValue};

pub const TRANSACTION_ID_HEADER: &str = "x-transaction-id";
pub const ACCEL_BUFFERING_HEADER: &str = "x-accel-buffering";

/// Caller hints copied onto upstream requests for their audit trail.
const CALLER_HINT_HEADERS: [&str; 5] = [
    "x-forwarded-for",
    "x-real-ip",
    "x-vercel-ip-country",
    "x-vercel-ip-country-region",
    "x-vercel-ip-city",
];

pub fn thread_caller_metadata(inbound: &HeaderMap, outbound: &mut HeaderMap, correlation_id: &str) {
    for name in CALLER_HINT_HEADERS {
        if let Some(value) = inbound.get(name) {
            outbound.insert(HeaderName::from_static(name), value.clone());
        }
    }
    if let Some(agent) = inbound.get(USER_AGENT) {
        outbound.insert(USER_AGENT, agent.clone());
    }
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        outbound.insert(HeaderName::from_static(TRANSACTION_ID_HEADER), value);
    }
}

/// Make an upstream response head safe to relay to a browser.
pub fn sanitize_response_headers(headers: &mut HeaderMap) {
    // A browser would pop a credential prompt for these.
    headers.remove(WWW_AUTHENTICATE);
    headers.remove(PROXY_AUTHENTICATE);

    // The upstream client hands us decoded bytes.
    if headers.remove(CONTENT_ENCODING).is_some() {
        headers.remove(CONTENT_LENGTH);
    }

    for name in [CONNECTION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");

    headers.insert(
        HeaderName::from_static(ACCEL_BUFFERING_HEADER),
        HeaderValue::from_static("no"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prompting_and_encoding_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer realm=\"x\""));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("br"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("openai-model", HeaderValue::from_static("gpt-4-0613"));

        sanitize_response_headers(&mut headers);

        for name in ["www-authenticate", "content-encoding", "content-length", "transfer-encoding"] {
            assert!(headers.get(name).is_none(), "{name} should be removed");
        }
        assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");
        assert_eq!(headers.get("openai-model").unwrap(), "gpt-4-0613");
    }

    #[test]
    fn keeps_length_of_unencoded_bodies() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        sanitize_response_headers(&mut headers);
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "42");
    }

    #[test]
    fn threads_hints_and_correlation_id() {
        let mut inbound = HeaderMap::new();
        inbound.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        inbound.insert("x-vercel-ip-country", HeaderValue::from_static("SE"));
        inbound.insert(USER_AGENT, HeaderValue::from_static("test-agent"));
        inbound.insert("cookie", HeaderValue::from_static("__session=secret"));

        let mut outbound = HeaderMap::new();
        thread_caller_metadata(&inbound, &mut outbound, "tx-42");

        assert_eq!(outbound.get("x-forwarded-for").unwrap(), "203.0.113.9");
        assert_eq!(outbound.get("x-vercel-ip-country").unwrap(), "SE");
        assert_eq!(outbound.get(USER_AGENT).unwrap(), "test-agent");
        assert_eq!(outbound.get(TRANSACTION_ID_HEADER).unwrap(), "tx-42");
        assert!(outbound.get("cookie").is_none());
    }
}
