//! Bearer token middleware
//!
//! Protected routes run behind [`require_bearer`]. A missing or malformed
//! `Authorization` header is `unauthorized`; a token the validator rejects
//! is `invalid_token`. Both are 401 with a `WWW-Authenticate` challenge
//! naming the protected resource metadata URL, so MCP clients can discover
//! the authorization server. In `disabled` mode requests pass through.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use mcp_oauth::{ErrorKind, OAuthError};
use tracing::{debug, warn};

use crate::error::BearerChallenge;
use crate::metrics;
use crate::mode::AuthRuntime;

/// The principal behind a validated bearer token, attached as a request
/// extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Option<String>,
    pub scope: Option<String>,
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is case-insensitive (RFC 7235).
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub async fn require_bearer(
    State(runtime): State<Arc<AuthRuntime>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(validator) = runtime.validator.as_ref() else {
        return next.run(request).await;
    };

    let challenge = |error: OAuthError| {
        BearerChallenge {
            error,
            resource_metadata: runtime.resource_metadata_url(),
        }
        .into_response()
    };

    let Some(token) = bearer_token(request.headers()).map(str::to_owned) else {
        metrics::record_token_validation("missing");
        debug!(path = %request.uri().path(), "request without bearer token");
        return challenge(OAuthError::new(
            ErrorKind::Unauthorized,
            "Missing or malformed Authorization header",
        ));
    };

    let result = validator.validate(&token).await;
    if !result.valid {
        let reason = result.error.unwrap_or_else(|| "Invalid token".to_string());
        metrics::record_token_validation("invalid");
        warn!(reason = %reason, path = %request.uri().path(), "bearer token rejected");
        return challenge(OAuthError::new(ErrorKind::InvalidToken, reason));
    }

    metrics::record_token_validation("valid");
    request.extensions_mut().insert(AuthenticatedUser {
        user_id: result.user_id,
        scope: result.scope,
    });
    next.run(request).await
}
