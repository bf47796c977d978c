use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

const AMZ_FORMAT: &[FormatItem<'_>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");
const DATE_FORMAT: &[FormatItem<'_>] = format_description!("[year][month][day]");
const EXPIRATION_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].000Z");

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("upload credentials are not configured")]
    MissingCredentials,
    #[error("failed to format signing time: {0}")]
    Time(#[from] time::error::Format),
    #[error("invalid signing key length")]
    Key,
}

/// One browser-side object upload to authorize.
#[derive(Debug, Clone)]
pub struct PostPolicy<'a> {
    pub bucket: &'a str,
    pub region: &'a str,
    pub key: &'a str,
    pub content_type: &'a str,
    pub max_size: u64,
    pub acl: &'a str,
    pub expires: Duration,
}

/// Signs S3 POST policies (SigV4, query-less form upload).
#[derive(Clone)]
pub struct PostPolicySigner {
    access_key: String,
    secret_key: String,
}

impl PostPolicySigner {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Result<Self, SignError> {
        let access_key = access_key.into();
        let secret_key = secret_key.into();
        if access_key.trim().is_empty() || secret_key.trim().is_empty() {
            return Err(SignError::MissingCredentials);
        }
        Ok(Self {
            access_key,
            secret_key,
        })
    }

    /// Form fields the browser must send alongside the file.
    pub fn sign(
        &self,
        policy: &PostPolicy<'_>,
        now: OffsetDateTime,
    ) -> Result<BTreeMap<String, String>, SignError> {
        let amz_date = now.format(AMZ_FORMAT)?;
        let date = now.format(DATE_FORMAT)?;
        let expiration = (now + policy.expires).format(EXPIRATION_FORMAT)?;
        let credential = format!(
            "{}/{date}/{}/{SERVICE}/aws4_request",
            self.access_key, policy.region
        );

        let document = json!({
            "expiration": expiration,
            "conditions": [
                { "bucket": policy.bucket },
                { "key": policy.key },
                { "acl": policy.acl },
                { "Content-Type": policy.content_type },
                ["content-length-range", 0, policy.max_size],
                ["starts-with", "$Content-Type", policy.content_type],
                { "x-amz-algorithm": ALGORITHM },
                { "x-amz-credential": credential },
                { "x-amz-date": amz_date },
            ],
        });
        let encoded = STANDARD.encode(document.to_string());
        let signing_key = self.signing_key(&date, policy.region)?;
        let signature = hex_encode(&hmac_sha256(&signing_key, &encoded)?);

        Ok(BTreeMap::from([
            ("bucket".to_string(), policy.bucket.to_string()),
            ("key".to_string(), policy.key.to_string()),
            ("acl".to_string(), policy.acl.to_string()),
            ("Content-Type".to_string(), policy.content_type.to_string()),
            ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
            ("X-Amz-Credential".to_string(), credential),
            ("X-Amz-Date".to_string(), amz_date),
            ("Policy".to_string(), encoded),
            ("X-Amz-Signature".to_string(), signature),
        ]))
    }

    fn signing_key(&self, date: &str, region: &str) -> Result<Vec<u8>, SignError> {
        signing_key(&self.secret_key, date, region, SERVICE)
    }
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>, SignError> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date)?;
    let k_region = hmac_sha256(&k_date, region)?;
    let k_service = hmac_sha256(&k_region, service)?;
    hmac_sha256(&k_service, "aws4_request")
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, SignError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SignError::Key)?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX_CHARS[(byte >> 4) as usize] as char);
        out.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    out
}
