//! In-process mock identity provider for tests
//!
//! Serves a token endpoint, an introspection endpoint and an HS256 key set on
//! an ephemeral local port. Responses are keyed on fixed token/code values so
//! tests can drive each validation branch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;
use tokio::net::TcpListener;

use crate::upstream::UpstreamIdp;

pub(crate) const SIGNING_SECRET: &[u8] = b"mock-idp-signing-secret-0123456789";
pub(crate) const KEY_ID: &str = "test-key";
pub(crate) const AUDIENCE: &str = "mcp-audience";

#[derive(Clone, Default)]
struct MockState {
    token_requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
    jwks_fetches: Arc<AtomicUsize>,
    basic_auth_seen: Arc<AtomicBool>,
}

pub(crate) struct MockIdp {
    pub url: String,
    state: MockState,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockIdp {
    /// Upstream config pointing at this mock.
    pub fn upstream(&self, audience: Option<&str>) -> UpstreamIdp {
        UpstreamIdp {
            issuer: self.url.clone(),
            authorization_endpoint: format!("{}/authorize", self.url),
            token_endpoint: format!("{}/token", self.url),
            introspection_endpoint: format!("{}/introspect", self.url),
            jwks_uri: format!("{}/.well-known/jwks.json", self.url),
            client_id: "mcp-server".into(),
            client_secret: Some(Secret::new("idp-secret".to_string())),
            audience: audience.map(str::to_string),
            scopes: vec!["openid".into(), "profile".into()],
            redirect_uri: "http://localhost:3000/callback".into(),
        }
    }

    /// Form bodies received by the token endpoint, oldest first.
    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.state.token_requests.lock().unwrap().clone()
    }

    pub fn jwks_fetches(&self) -> usize {
        self.state.jwks_fetches.load(Ordering::SeqCst)
    }

    pub fn saw_basic_auth(&self) -> bool {
        self.state.basic_auth_seen.load(Ordering::SeqCst)
    }
}

pub(crate) async fn start_mock_idp() -> MockIdp {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = MockState::default();

    let app = Router::new()
        .route("/.well-known/jwks.json", get(jwks))
        .route("/token", post(token))
        .route("/introspect", post(introspect))
        .with_state(state.clone());

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockIdp {
        url: format!("http://{addr}"),
        state,
        _handle: handle,
    }
}

async fn jwks(State(state): State<MockState>) -> Json<serde_json::Value> {
    state.jwks_fetches.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "keys": [{
            "kty": "oct",
            "kid": KEY_ID,
            "alg": "HS256",
            "k": URL_SAFE_NO_PAD.encode(SIGNING_SECRET),
        }]
    }))
}

async fn token(
    State(state): State<MockState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let accepted = form.get("code").map(String::as_str) == Some("idp-code")
        && form.get("client_id").map(String::as_str) == Some("mcp-server")
        && form.contains_key("code_verifier");
    state.token_requests.lock().unwrap().push(form);

    if accepted {
        Json(json!({
            "access_token": "idp-access-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "idp-refresh-token",
        }))
        .into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant" })),
        )
            .into_response()
    }
}

async fn introspect(
    State(state): State<MockState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if basic {
        state.basic_auth_seen.store(true, Ordering::SeqCst);
    }

    let token = form.get("token").cloned().unwrap_or_default();
    let body = match token.as_str() {
        "idp-access-token" | "opaque-active" => json!({
            "active": true,
            "sub": "alice",
            "aud": AUDIENCE,
            "scope": "openid profile",
        }),
        "opaque-username" => json!({ "active": true, "username": "bob" }),
        "opaque-user-id" => json!({ "active": true, "user_id": "carol", "username": "ignored" }),
        "wrong-aud" => json!({ "active": true, "sub": "mallory", "aud": ["other"] }),
        "server-error" => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "bad-json" => return (StatusCode::OK, "not json").into_response(),
        t if t.contains('.') => json!({
            "active": true,
            "sub": "introspected-user",
            "aud": AUDIENCE,
        }),
        _ => json!({ "active": false }),
    };
    Json(body).into_response()
}

/// Sign an HS256 JWT with the given key id and secret.
pub(crate) fn mint_jwt(kid: &str, secret: &[u8], claims: serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(secret)).unwrap()
}

pub(crate) fn unix_now() -> u64 {
    crate::types::now_millis() / 1000
}
