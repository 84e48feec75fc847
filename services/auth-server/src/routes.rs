//! OAuth and discovery endpoints
//!
//! Which routes exist depends on the auth mode; see [`oauth_router`] and
//! [`discovery_router`]. Handlers translate HTTP into coordinator calls and
//! coordinator errors into OAuth error bodies.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{MatchedPath, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Extension, Form, Json, Router};
use mcp_oauth::{
    AuthorizationCoordinator, AuthorizeParams, CallbackParams, IntrospectionResponse, OAuthError,
    TokenParams,
};
use serde::Deserialize;
use tracing::{Instrument, debug, info_span};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::metrics;
use crate::mode::AuthRuntime;

/// `/introspect` and `/revoke` form body. `token_type_hint` is accepted
/// and ignored; both token kinds are looked up.
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub token: Option<String>,
}

/// Authorization endpoints, present when this server issues its own tokens.
/// `/callback` exists only with an upstream IdP.
pub fn oauth_router<S>(coordinator: Arc<AuthorizationCoordinator>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut router = Router::new()
        .route("/authorize", get(authorize))
        .route("/token", post(token))
        .route("/introspect", post(introspect))
        .route("/revoke", post(revoke));
    if coordinator.uses_upstream() {
        router = router.route("/callback", get(callback));
    }
    router.with_state(coordinator)
}

/// RFC 8414 and RFC 9728 documents, per mode.
pub fn discovery_router<S>(runtime: Arc<AuthRuntime>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut router = Router::new();
    if runtime.authorization_server_metadata().is_some() {
        router = router.route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        );
    }
    if runtime.protected_resource_metadata().is_some() {
        router = router.route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        );
    }
    router.with_state(runtime)
}

async fn authorization_server_metadata(
    State(runtime): State<Arc<AuthRuntime>>,
) -> Result<Response, StatusCode> {
    let metadata = runtime
        .authorization_server_metadata()
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(metadata).into_response())
}

async fn protected_resource_metadata(
    State(runtime): State<Arc<AuthRuntime>>,
) -> Result<Response, StatusCode> {
    let metadata = runtime
        .protected_resource_metadata()
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(metadata).into_response())
}

async fn authorize(
    State(coordinator): State<Arc<AuthorizationCoordinator>>,
    query: Result<Query<AuthorizeParams>, QueryRejection>,
) -> Result<Redirect, ApiError> {
    let Query(params) = query.map_err(|e| OAuthError::invalid_request(e.body_text()))?;
    let location = coordinator.authorize(params).await?;
    Ok(Redirect::to(&location))
}

async fn callback(
    State(coordinator): State<Arc<AuthorizationCoordinator>>,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Redirect, ApiError> {
    let Query(params) = query.map_err(|e| OAuthError::invalid_request(e.body_text()))?;
    let location = coordinator.callback(params).await?;
    Ok(Redirect::to(&location))
}

/// Metric label for a requested grant type. Unknown values collapse to
/// `other` to keep label cardinality bounded.
fn grant_type_label(grant_type: Option<&str>) -> &'static str {
    match grant_type {
        Some("authorization_code") => "authorization_code",
        Some("refresh_token") => "refresh_token",
        None => "none",
        Some(_) => "other",
    }
}

async fn token(
    State(coordinator): State<Arc<AuthorizationCoordinator>>,
    form: Result<Form<TokenParams>, FormRejection>,
) -> Result<Response, ApiError> {
    let Form(params) = form.map_err(|e| OAuthError::invalid_request(e.body_text()))?;
    let grant_type = grant_type_label(params.grant_type.as_deref());

    match coordinator.token(params).await {
        Ok(issued) => {
            metrics::record_token_exchange(grant_type, "success");
            Ok((
                [
                    (header::CACHE_CONTROL, "no-store"),
                    (header::PRAGMA, "no-cache"),
                ],
                Json(issued),
            )
                .into_response())
        }
        Err(err) => {
            metrics::record_token_exchange(grant_type, err.kind.as_str());
            Err(err.into())
        }
    }
}

async fn introspect(
    State(coordinator): State<Arc<AuthorizationCoordinator>>,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Result<Json<IntrospectionResponse>, ApiError> {
    let Form(form) = form.map_err(|e| OAuthError::invalid_request(e.body_text()))?;
    let token = form
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("token is required"))?;
    Ok(Json(coordinator.introspect(&token).await))
}

async fn revoke(
    State(coordinator): State<Arc<AuthorizationCoordinator>>,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Result<StatusCode, ApiError> {
    let Form(form) = form.map_err(|e| OAuthError::invalid_request(e.body_text()))?;
    let token = form
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("token is required"))?;
    coordinator.revoke(&token).await;
    Ok(StatusCode::OK)
}

/// Placeholder for the MCP transport: reports who the request is
/// authenticated as.
pub async fn mcp_endpoint(user: Option<Extension<AuthenticatedUser>>) -> Json<serde_json::Value> {
    let (user_id, scope) = match user {
        Some(Extension(user)) => (user.user_id, user.scope),
        None => (None, None),
    };
    Json(serde_json::json!({
        "authenticated": user_id.is_some(),
        "user_id": user_id,
        "scope": scope,
    }))
}

/// Per-request id, span and metrics.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        route = %route
    );

    let started = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let status = response.status().as_u16();
    metrics::record_request(&route, status, started.elapsed().as_secs_f64());
    span.in_scope(|| debug!(status, "request completed"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_type_labels_are_bounded() {
        assert_eq!(
            grant_type_label(Some("authorization_code")),
            "authorization_code"
        );
        assert_eq!(grant_type_label(Some("refresh_token")), "refresh_token");
        assert_eq!(grant_type_label(Some("password")), "other");
        assert_eq!(grant_type_label(None), "none");
    }
}
