//! Discovery documents
//!
//! - RFC 8414 authorization server metadata, published when this server
//!   issues its own codes and tokens.
//! - RFC 9728 protected resource metadata, published whenever bearer tokens
//!   are required.

use serde::{Deserialize, Serialize};

use crate::constants::PKCE_METHOD_S256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    /// Metadata for a server reachable at `base_url` (no trailing slash).
    pub fn for_base_url(base_url: &str, scopes: &[String]) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            issuer: base.to_string(),
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
            introspection_endpoint: format!("{base}/introspect"),
            revocation_endpoint: format!("{base}/revoke"),
            response_types_supported: vec!["code".into()],
            grant_types_supported: vec!["authorization_code".into(), "refresh_token".into()],
            code_challenge_methods_supported: vec![PKCE_METHOD_S256.into()],
            token_endpoint_auth_methods_supported: vec!["none".into()],
            scopes_supported: scopes.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

impl ProtectedResourceMetadata {
    pub fn new(resource: &str, authorization_server: &str, scopes: &[String]) -> Self {
        Self {
            resource: resource.trim_end_matches('/').to_string(),
            authorization_servers: vec![authorization_server.trim_end_matches('/').to_string()],
            bearer_methods_supported: vec!["header".into()],
            scopes_supported: scopes.to_vec(),
        }
    }
}

/// URL of the protected resource metadata document for `base_url`.
pub fn resource_metadata_url(base_url: &str) -> String {
    format!(
        "{}/.well-known/oauth-protected-resource",
        base_url.trim_end_matches('/')
    )
}
