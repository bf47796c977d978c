use std::collections::HashSet;

use http::HeaderMap;
use http::header::{AUTHORIZATION, COOKIE};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use chatgate_provider_core::Identity;

use crate::config::{AccessConfig, SessionConfig};
use crate::error::GateError;

pub const ACCESS_CODE_PREFIX: &str = "nk-";
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Establishes who is calling. `None` means anonymous, never an error.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Resolver for deployments without sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl IdentityResolver for Anonymous {
    fn resolve(&self, _headers: &HeaderMap) -> Option<Identity> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

/// HS256 session token from a cookie or the `X-Session-Token` header.
pub struct JwtSessionResolver {
    key: DecodingKey,
    validation: Validation,
    cookie: String,
}

impl JwtSessionResolver {
    pub fn new(secret: &str, config: &SessionConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims = ["exp".to_string()].into_iter().collect();
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            cookie: config.cookie.clone(),
        }
    }

    fn token<'h>(&self, headers: &'h HeaderMap) -> Option<&'h str> {
        if let Some(token) = headers
            .get(SESSION_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
        {
            return Some(token);
        }
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie)
            .map(|(_, value)| value)
    }
}

impl IdentityResolver for JwtSessionResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = self.token(headers)?;
        let claims = match decode::<SessionClaims>(token, &self.key, &self.validation) {
            Ok(data) => data.claims,
            Err(err) => {
                debug!(event = "session_rejected", error = %err);
                return None;
            }
        };
        let id = claims.email.clone().or_else(|| claims.sub.clone())?;
        let identity = Identity::new(id);
        Some(match claims.sub {
            Some(sub) => identity.with_subject(sub),
            None => identity,
        })
    }
}

/// Outcome of a successful provider credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    /// Value for the upstream `Authorization` header.
    pub authorization: String,
    pub api_key: String,
    /// The server's own key is used rather than the caller's.
    pub system: bool,
}

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    config: AccessConfig,
    code_digests: HashSet<[u8; 32]>,
    server_key: Option<String>,
}

impl AccessPolicy {
    pub fn new(config: AccessConfig, server_key: Option<String>) -> Self {
        let code_digests = config
            .codes
            .iter()
            .map(|code| code.trim())
            .filter(|code| !code.is_empty())
            .map(digest)
            .collect();
        Self {
            config,
            code_digests,
            server_key: server_key.filter(|key| !key.trim().is_empty()),
        }
    }

    pub fn need_code(&self) -> bool {
        self.config.need_code
    }

    pub fn hide_user_api_key(&self) -> bool {
        self.config.hide_user_api_key
    }

    pub fn authorize(
        &self,
        headers: &HeaderMap,
        identity: Option<&Identity>,
    ) -> Result<AuthGrant, GateError> {
        if self.config.require_session && identity.is_none() {
            return Err(GateError::Auth("login required".into()));
        }

        let raw = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .trim();
        let bearer = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
        let (access_code, user_key) = match bearer.strip_prefix(ACCESS_CODE_PREFIX) {
            Some(code) => (Some(code), None),
            None if bearer.is_empty() => (None, None),
            None => (None, Some(bearer)),
        };

        if self.config.need_code
            && user_key.is_none()
            && !access_code.is_some_and(|code| self.code_digests.contains(&digest(code)))
        {
            let msg = if access_code.is_some() {
                "wrong access code"
            } else {
                "empty access code"
            };
            return Err(GateError::Auth(msg.into()));
        }

        if let Some(key) = user_key {
            if self.config.hide_user_api_key {
                return Err(GateError::Auth(
                    "you are not allowed to access with your own api key".into(),
                ));
            }
            return Ok(AuthGrant {
                authorization: format!("Bearer {key}"),
                api_key: key.to_string(),
                system: false,
            });
        }

        match &self.server_key {
            Some(key) => Ok(AuthGrant {
                authorization: format!("Bearer {key}"),
                api_key: key.clone(),
                system: true,
            }),
            None => Err(GateError::Auth("no api key available".into())),
        }
    }
}

fn digest(code: &str) -> [u8; 32] {
    Sha256::digest(code.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {value}")).unwrap());
        headers
    }

    fn policy(config: AccessConfig) -> AccessPolicy {
        AccessPolicy::new(config, Some("sk-server".into()))
    }

    #[test]
    fn access_code_unlocks_server_key() {
        let policy = policy(AccessConfig {
            need_code: true,
            codes: vec!["letmein".into()],
            ..AccessConfig::default()
        });

        let grant = policy.authorize(&bearer("nk-letmein"), None).unwrap();
        assert!(grant.system);
        assert_eq!(grant.authorization, "Bearer sk-server");

        let err = policy.authorize(&bearer("nk-guess"), None).unwrap_err();
        assert_eq!(err.to_string(), "wrong access code");
        let err = policy.authorize(&HeaderMap::new(), None).unwrap_err();
        assert_eq!(err.to_string(), "empty access code");
    }

    #[test]
    fn user_key_bypasses_code_unless_hidden() {
        let config = AccessConfig {
            need_code: true,
            codes: vec!["letmein".into()],
            ..AccessConfig::default()
        };
        let grant = policy(config.clone()).authorize(&bearer("sk-user"), None).unwrap();
        assert!(!grant.system);
        assert_eq!(grant.api_key, "sk-user");

        let hidden = policy(AccessConfig {
            hide_user_api_key: true,
            ..config
        });
        assert!(hidden.authorize(&bearer("sk-user"), None).is_err());
    }

    #[test]
    fn session_can_be_required() {
        let policy = policy(AccessConfig {
            require_session: true,
            ..AccessConfig::default()
        });
        assert!(policy.authorize(&bearer("sk-user"), None).is_err());
        let identity = Identity::new("ann@example.com");
        assert!(policy.authorize(&bearer("sk-user"), Some(&identity)).is_ok());
    }

    #[test]
    fn missing_server_key_is_auth_error() {
        let policy = AccessPolicy::new(AccessConfig::default(), None);
        assert!(matches!(
            policy.authorize(&HeaderMap::new(), None),
            Err(GateError::Auth(_))
        ));
    }

    fn token(secret: &str, exp_offset: i64) -> String {
        let exp = time::OffsetDateTime::now_utc().unix_timestamp() + exp_offset;
        encode(
            &Header::default(),
            &json!({ "email": "ann@example.com", "sub": "user_1", "exp": exp }),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn session_from_cookie_or_header() {
        let resolver = JwtSessionResolver::new("s3cret", &SessionConfig::default());

        let mut headers = HeaderMap::new();
        let cookie = format!("theme=dark; __session={}", token("s3cret", 3600));
        headers.insert(COOKIE, HeaderValue::from_str(&cookie).unwrap());
        let identity = resolver.resolve(&headers).unwrap();
        assert_eq!(identity.id, "ann@example.com");
        assert_eq!(identity.owner_id(), "user_1");

        let mut headers = HeaderMap::new();
        headers.insert(
            SESSION_TOKEN_HEADER,
            HeaderValue::from_str(&token("s3cret", 3600)).unwrap(),
        );
        assert!(resolver.resolve(&headers).is_some());
    }

    #[test]
    fn bad_or_expired_session_is_anonymous() {
        let resolver = JwtSessionResolver::new("s3cret", &SessionConfig::default());
        for token in [token("other", 3600), token("s3cret", -3600), "garbage".to_string()] {
            let mut headers = HeaderMap::new();
            headers.insert(SESSION_TOKEN_HEADER, HeaderValue::from_str(&token).unwrap());
            assert!(resolver.resolve(&headers).is_none());
        }
    }
}
