//! Error types for OAuth operations
//!
//! Two layers: [`Error`] covers failed outbound calls (IdP token endpoint,
//! introspection, JWKS) and is never shown to clients. [`OAuthError`] is the
//! protocol-level error the coordinator returns; the server renders it as an
//! RFC 6749 `{error, error_description}` body.

use std::fmt;

/// Errors from outbound OAuth operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("introspection failed: {0}")]
    Introspection(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JWKS fetch failed: {0}")]
    Jwks(String),

    #[error("invalid URL: {0}")]
    Url(String),
}

/// Result alias for outbound OAuth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// OAuth error codes returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    InvalidGrant,
    InvalidClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    ServerError,
    Unauthorized,
    InvalidToken,
}

impl ErrorKind {
    /// Wire value of the `error` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidGrant => "invalid_grant",
            ErrorKind::InvalidClient => "invalid_client",
            ErrorKind::UnsupportedGrantType => "unsupported_grant_type",
            ErrorKind::UnsupportedResponseType => "unsupported_response_type",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidToken => "invalid_token",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol error with a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {description}")]
pub struct OAuthError {
    pub kind: ErrorKind,
    pub description: String,
}

impl OAuthError {
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidGrant, description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidClient, description)
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, description)
    }
}
