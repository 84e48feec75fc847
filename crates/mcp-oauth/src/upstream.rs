//! External identity provider client
//!
//! Everything the server asks of the upstream IdP: the authorization URL the
//! user agent is sent to, the code exchange on callback, token
//! introspection, and the published signing keys. Endpoint URLs come from
//! config; none are discovered at runtime.

use common::Secret;
use jsonwebtoken::jwk::JwkSet;
use reqwest::Url;
use tracing::debug;

use crate::constants::PKCE_METHOD_S256;
use crate::error::{Error, Result};
use crate::types::{ExternalTokens, IntrospectionResponse};

/// Upstream IdP endpoints and this server's client registration with it.
#[derive(Debug, Clone)]
pub struct UpstreamIdp {
    /// Expected `iss` claim on JWT access tokens
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub introspection_endpoint: String,
    pub jwks_uri: String,
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
    /// When set, tokens must carry this audience
    pub audience: Option<String>,
    pub scopes: Vec<String>,
    /// This server's `/callback` URL as registered with the IdP
    pub redirect_uri: String,
}

impl UpstreamIdp {
    /// Build the IdP authorization URL for the server's own PKCE leg.
    pub fn authorization_url(&self, state: &str, challenge: &str) -> Result<String> {
        let mut url = Url::parse(&self.authorization_endpoint)
            .map_err(|e| Error::Url(format!("authorization_endpoint: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", PKCE_METHOD_S256)
                .append_pair("state", state);
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
        }
        Ok(url.into())
    }

    /// Exchange an IdP authorization code using the server's stored verifier.
    pub async fn exchange_code(
        &self,
        client: &reqwest::Client,
        code: &str,
        verifier: &str,
    ) -> Result<ExternalTokens> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose().as_str()));
        }

        let response = client
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<ExternalTokens>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
    }

    /// Ask the IdP whether a token is active (RFC 7662).
    ///
    /// Transport failures are [`Error::Http`], non-success statuses are
    /// [`Error::Introspection`], and an unreadable body is
    /// [`Error::InvalidResponse`].
    pub async fn introspect(
        &self,
        client: &reqwest::Client,
        token: &str,
    ) -> Result<IntrospectionResponse> {
        let mut request = client
            .post(&self.introspection_endpoint)
            .form(&[("token", token), ("token_type_hint", "access_token")]);
        if let Some(secret) = &self.client_secret {
            request = request.basic_auth(&self.client_id, Some(secret.expose()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(format!("introspection request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Introspection(format!(
                "introspection endpoint returned {status}"
            )));
        }

        response
            .json::<IntrospectionResponse>()
            .await
            .map_err(|e| Error::InvalidResponse(format!("introspection body: {e}")))
    }

    /// Fetch the IdP's published signing keys.
    pub async fn fetch_jwks(&self, client: &reqwest::Client) -> Result<JwkSet> {
        debug!(jwks_uri = %self.jwks_uri, "fetching signing keys");
        let response = client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| Error::Jwks(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Jwks(format!("JWKS endpoint returned {status}")));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| Error::Jwks(format!("invalid key set: {e}")))
    }
}
