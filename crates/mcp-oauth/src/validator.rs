//! Bearer token validation
//!
//! Two implementations of [`TokenValidator`]:
//!
//! - [`RemoteTokenValidator`] checks tokens issued by the upstream IdP. JWTs
//!   are verified locally against the IdP's published keys; anything that
//!   is not conclusively accepted or rejected that way goes to the IdP's
//!   introspection endpoint.
//! - [`AccessTokenStore`] checks tokens this server minted itself.
//!
//! Validation never fails: every failure is a result with `valid: false`
//! and a short reason suitable for an `error_description`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Error;
use crate::jwks::JwksCache;
use crate::tokens::AccessTokenStore;
use crate::upstream::UpstreamIdp;

/// Outcome of validating one bearer token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub user_id: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(user_id: Option<String>, scope: Option<String>) -> Self {
        Self {
            valid: true,
            user_id,
            scope,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Answers "is this bearer token valid, and for which user?"
///
/// Uses `Pin<Box<dyn Future>>` so validators can be shared as
/// `Arc<dyn TokenValidator>`.
pub trait TokenValidator: Send + Sync {
    fn validate<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = TokenValidationResult> + Send + 'a>>;
}

impl TokenValidator for AccessTokenStore {
    fn validate<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = TokenValidationResult> + Send + 'a>> {
        Box::pin(self.validate_token(token))
    }
}

/// Claims read from upstream JWT access tokens.
#[derive(Debug, Deserialize)]
struct JwtClaims {
    sub: Option<String>,
    user_id: Option<String>,
    username: Option<String>,
    scope: Option<ScopeClaim>,
}

/// `scope` claim: space-delimited string, or an array as some IdPs emit.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    Delimited(String),
    List(Vec<String>),
}

impl ScopeClaim {
    fn into_delimited(self) -> String {
        match self {
            ScopeClaim::Delimited(scope) => scope,
            ScopeClaim::List(scopes) => scopes.join(" "),
        }
    }
}

impl JwtClaims {
    fn principal(self) -> (Option<String>, Option<String>) {
        (
            self.sub.or(self.user_id).or(self.username),
            self.scope.map(ScopeClaim::into_delimited),
        )
    }
}

/// Result of the local JWT check.
enum JwtOutcome {
    Verified(TokenValidationResult),
    Rejected(&'static str),
    /// Not conclusive locally; ask the introspection endpoint
    Fallthrough(String),
}

/// Validates tokens issued by the upstream IdP.
pub struct RemoteTokenValidator {
    idp: Arc<UpstreamIdp>,
    client: reqwest::Client,
    jwks: JwksCache,
}

impl RemoteTokenValidator {
    pub fn new(idp: Arc<UpstreamIdp>, client: reqwest::Client) -> Self {
        Self {
            jwks: JwksCache::new(idp.clone(), client.clone()),
            idp,
            client,
        }
    }

    pub async fn validate_token(&self, token: &str) -> TokenValidationResult {
        if looks_like_jwt(token) {
            match self.verify_jwt(token).await {
                JwtOutcome::Verified(result) => return result,
                JwtOutcome::Rejected(reason) => {
                    warn!(reason, "JWT rejected");
                    return TokenValidationResult::invalid(reason);
                }
                JwtOutcome::Fallthrough(reason) => {
                    debug!(reason = %reason, "JWT not verified locally, falling back to introspection");
                }
            }
        }
        self.introspect(token).await
    }

    async fn verify_jwt(&self, token: &str) -> JwtOutcome {
        let header = match decode_header(token) {
            Ok(header) => header,
            // Three dot-separated segments but no JWT header: likely an opaque token
            Err(e) => return JwtOutcome::Fallthrough(format!("header: {e}")),
        };

        let jwk = match self.jwks.find(header.kid.as_deref()).await {
            Ok(Some(jwk)) => jwk,
            Ok(None) => return JwtOutcome::Rejected("No matching key found"),
            Err(e) => return JwtOutcome::Fallthrough(e.to_string()),
        };

        let key = match DecodingKey::from_jwk(&jwk) {
            Ok(key) => key,
            Err(e) => return JwtOutcome::Fallthrough(format!("unusable signing key: {e}")),
        };

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.idp.issuer]);
        match &self.idp.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        match decode::<JwtClaims>(token, &key, &validation) {
            Ok(data) => {
                let (user_id, scope) = data.claims.principal();
                JwtOutcome::Verified(TokenValidationResult::valid(user_id, scope))
            }
            Err(e) => match e.kind() {
                JwtErrorKind::ExpiredSignature => JwtOutcome::Rejected("Token expired"),
                JwtErrorKind::InvalidToken
                | JwtErrorKind::Base64(_)
                | JwtErrorKind::Json(_)
                | JwtErrorKind::Utf8(_) => JwtOutcome::Rejected("Invalid token"),
                _ => JwtOutcome::Fallthrough(e.to_string()),
            },
        }
    }

    async fn introspect(&self, token: &str) -> TokenValidationResult {
        let response = match self.idp.introspect(&self.client, token).await {
            Ok(response) => response,
            Err(e @ (Error::Http(_) | Error::Introspection(_))) => {
                warn!(error = %e, "token introspection failed");
                return TokenValidationResult::invalid("Token introspection failed");
            }
            Err(e) => {
                warn!(error = %e, "token validation failed");
                return TokenValidationResult::invalid("Token validation failed");
            }
        };

        if !response.active {
            return TokenValidationResult::invalid("Token is not active");
        }

        if let Some(expected) = &self.idp.audience {
            let matches = response.aud.as_ref().is_some_and(|aud| aud.contains(expected));
            if !matches {
                warn!(expected, "introspected token audience mismatch");
                return TokenValidationResult::invalid("Token audience mismatch");
            }
        }

        TokenValidationResult::valid(response.principal(), response.scope)
    }
}

impl TokenValidator for RemoteTokenValidator {
    fn validate<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = TokenValidationResult> + Send + 'a>> {
        Box::pin(self.validate_token(token))
    }
}

/// Exactly three non-empty base64url segments.
fn looks_like_jwt(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|s| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{AUDIENCE, KEY_ID, SIGNING_SECRET, mint_jwt, start_mock_idp, unix_now};
    use serde_json::json;

    #[test]
    fn jwt_classification() {
        assert!(looks_like_jwt("aaa.bbb.ccc"));
        assert!(looks_like_jwt("eyJh-_.eyJ.sig_-"));
        assert!(!looks_like_jwt("garbage"));
        assert!(!looks_like_jwt("a.b"));
        assert!(!looks_like_jwt("a..c"));
        assert!(!looks_like_jwt("a.b.c.d"));
        assert!(!looks_like_jwt("a+b.c.d"));
    }

    async fn validator(audience: Option<&str>) -> (RemoteTokenValidator, crate::test_support::MockIdp) {
        let idp = start_mock_idp().await;
        let validator = RemoteTokenValidator::new(
            Arc::new(idp.upstream(audience)),
            reqwest::Client::new(),
        );
        (validator, idp)
    }

    #[tokio::test]
    async fn valid_jwt_is_verified_locally() {
        let (validator, idp) = validator(Some(AUDIENCE)).await;
        let token = mint_jwt(
            KEY_ID,
            SIGNING_SECRET,
            json!({ "sub": "alice", "iss": idp.url, "aud": AUDIENCE, "exp": unix_now() + 600, "scope": "mcp" }),
        );

        let result = validator.validate_token(&token).await;
        assert!(result.valid, "got: {result:?}");
        assert_eq!(result.user_id.as_deref(), Some("alice"));
        assert_eq!(result.scope.as_deref(), Some("mcp"));
    }

    #[tokio::test]
    async fn jwt_with_scope_array_is_verified() {
        let (validator, idp) = validator(None).await;
        let token = mint_jwt(
            KEY_ID,
            SIGNING_SECRET,
            json!({ "sub": "alice", "iss": idp.url, "exp": unix_now() + 600, "scope": ["mcp", "read"] }),
        );

        let result = validator.validate_token(&token).await;
        assert!(result.valid, "got: {result:?}");
        assert_eq!(result.user_id.as_deref(), Some("alice"));
        assert_eq!(result.scope.as_deref(), Some("mcp read"));
    }

    #[tokio::test]
    async fn expired_jwt_is_rejected() {
        let (validator, idp) = validator(None).await;
        let token = mint_jwt(
            KEY_ID,
            SIGNING_SECRET,
            json!({ "sub": "alice", "iss": idp.url, "exp": unix_now() - 3600 }),
        );

        let result = validator.validate_token(&token).await;
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("Token expired"));
    }

    #[tokio::test]
    async fn unknown_kid_is_rejected() {
        let (validator, idp) = validator(None).await;
        let token = mint_jwt(
            "unpublished-key",
            SIGNING_SECRET,
            json!({ "sub": "alice", "iss": idp.url, "exp": unix_now() + 600 }),
        );

        let result = validator.validate_token(&token).await;
        assert_eq!(result.error.as_deref(), Some("No matching key found"));
    }

    #[tokio::test]
    async fn structurally_invalid_claims_are_rejected() {
        let (validator, _idp) = validator(None).await;
        let token = mint_jwt(KEY_ID, SIGNING_SECRET, json!("not-a-claims-object"));

        let result = validator.validate_token(&token).await;
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("Invalid token"));
    }

    #[tokio::test]
    async fn bad_signature_falls_back_to_introspection() {
        let (validator, idp) = validator(None).await;
        let token = mint_jwt(
            KEY_ID,
            b"some-other-secret-entirely",
            json!({ "sub": "alice", "iss": idp.url, "exp": unix_now() + 600 }),
        );

        let result = validator.validate_token(&token).await;
        assert!(result.valid, "introspection should accept: {result:?}");
        assert_eq!(result.user_id.as_deref(), Some("introspected-user"));
    }

    #[tokio::test]
    async fn unparseable_jwt_falls_back_to_introspection() {
        let (validator, _idp) = validator(None).await;
        let result = validator.validate_token("abc.def.ghi").await;
        assert!(result.valid, "got: {result:?}");
        assert_eq!(result.user_id.as_deref(), Some("introspected-user"));
    }

    #[tokio::test]
    async fn wrong_issuer_falls_back_to_introspection() {
        let (validator, _idp) = validator(None).await;
        let token = mint_jwt(
            KEY_ID,
            SIGNING_SECRET,
            json!({ "sub": "alice", "iss": "https://elsewhere", "exp": unix_now() + 600 }),
        );
        let result = validator.validate_token(&token).await;
        assert_eq!(result.user_id.as_deref(), Some("introspected-user"));
    }

    #[tokio::test]
    async fn garbage_opaque_token_is_not_active() {
        let (validator, _idp) = validator(None).await;
        let result = validator.validate_token("garbage").await;
        assert_eq!(
            result,
            TokenValidationResult::invalid("Token is not active")
        );
    }

    #[tokio::test]
    async fn garbage_with_unreachable_introspection_fails_cleanly() {
        let idp = start_mock_idp().await;
        let mut upstream = idp.upstream(None);
        upstream.introspection_endpoint = "http://127.0.0.1:1/introspect".into();
        let validator = RemoteTokenValidator::new(Arc::new(upstream), reqwest::Client::new());

        let result = validator.validate_token("garbage").await;
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("Token introspection failed"));
    }

    #[tokio::test]
    async fn introspection_server_error_and_bad_body() {
        let (validator, _idp) = validator(None).await;
        assert_eq!(
            validator.validate_token("server-error").await.error.as_deref(),
            Some("Token introspection failed")
        );
        assert_eq!(
            validator.validate_token("bad-json").await.error.as_deref(),
            Some("Token validation failed")
        );
    }

    #[tokio::test]
    async fn introspection_user_id_priority() {
        let (validator, _idp) = validator(None).await;
        assert_eq!(
            validator.validate_token("opaque-active").await.user_id.as_deref(),
            Some("alice")
        );
        assert_eq!(
            validator.validate_token("opaque-user-id").await.user_id.as_deref(),
            Some("carol")
        );
        assert_eq!(
            validator.validate_token("opaque-username").await.user_id.as_deref(),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn introspection_enforces_configured_audience() {
        let (validator, _idp) = validator(Some(AUDIENCE)).await;
        assert!(validator.validate_token("opaque-active").await.valid);
        assert_eq!(
            validator.validate_token("wrong-aud").await.error.as_deref(),
            Some("Token audience mismatch")
        );
        assert_eq!(
            validator.validate_token("opaque-username").await.error.as_deref(),
            Some("Token audience mismatch"),
            "a token without aud cannot satisfy a configured audience"
        );
    }

    #[tokio::test]
    async fn validators_are_usable_as_trait_objects() {
        let (remote, _idp) = validator(None).await;
        let local = AccessTokenStore::new(
            crate::constants::DEFAULT_ACCESS_TOKEN_TTL,
            crate::constants::DEFAULT_REFRESH_TOKEN_TTL,
        );
        let validators: Vec<Arc<dyn TokenValidator>> = vec![Arc::new(remote), Arc::new(local)];
        for v in &validators {
            assert!(!v.validate("garbage").await.valid);
        }
    }
}
