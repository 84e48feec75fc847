//! HTTP rendering of OAuth protocol errors
//!
//! Every error body is `{"error": <kind>, "error_description": <text>}`
//! (RFC 6749 section 5.2). Bearer failures additionally carry a
//! `WWW-Authenticate` challenge pointing at the resource metadata.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use mcp_oauth::{ErrorKind, OAuthError};
use serde_json::json;

/// An [`OAuthError`] on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub OAuthError);

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        Self(err)
    }
}

/// HTTP status for each protocol error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest
        | ErrorKind::InvalidGrant
        | ErrorKind::UnsupportedGrantType
        | ErrorKind::UnsupportedResponseType => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidClient | ErrorKind::Unauthorized | ErrorKind::InvalidToken => {
            StatusCode::UNAUTHORIZED
        }
        ErrorKind::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let OAuthError { kind, description } = self.0;
        (
            status_for(kind),
            [(header::CACHE_CONTROL, "no-store")],
            Json(json!({
                "error": kind.as_str(),
                "error_description": description,
            })),
        )
            .into_response()
    }
}

/// A 401 from the bearer middleware.
pub struct BearerChallenge {
    pub error: OAuthError,
    pub resource_metadata: String,
}

impl IntoResponse for BearerChallenge {
    fn into_response(self) -> Response {
        let challenge = match self.error.kind {
            ErrorKind::InvalidToken => format!(
                "Bearer error=\"invalid_token\", resource_metadata=\"{}\"",
                self.resource_metadata
            ),
            _ => format!("Bearer resource_metadata=\"{}\"", self.resource_metadata),
        };
        let mut response = ApiError(self.error).into_response();
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}
