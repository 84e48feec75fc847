//! Authorization flow coordinator
//!
//! Drives the authorization-code flow for MCP clients:
//!
//! 1. `authorize` validates the client's request (PKCE S256 mandatory). With
//!    an upstream IdP it stores a pending request, generates a second PKCE
//!    pair for its own leg, and redirects to the IdP with the request id as
//!    `state`. In local mode it approves immediately.
//! 2. `callback` recovers the pending request from `state`, exchanges the
//!    IdP code with the stored verifier, mints this server's own code bound
//!    to the client's original challenge, and redirects to the client.
//! 3. `token` exchanges that code (or a refresh token) for an access token.
//!
//! The minted code can only be redeemed with the client's verifier, and only
//! exists once the server has completed its own IdP exchange.

use std::sync::Arc;

use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::clients::ClientRegistry;
use crate::constants::{AUTHORIZATION_CODE_TTL, PENDING_REQUEST_TTL, PKCE_METHOD_S256};
use crate::error::{ErrorKind, OAuthError};
use crate::grants::AuthorizationGrant;
use crate::pending::PendingAuthRequest;
use crate::pkce::PkcePair;
use crate::stores::AuthStores;
use crate::types::{IntrospectionResponse, IssuedToken, expires_in, random_token};
use crate::upstream::UpstreamIdp;
use crate::validator::RemoteTokenValidator;

/// Who authenticates the user.
pub enum Authority {
    /// Users sign in at the upstream IdP (proxy mode)
    Upstream {
        idp: Arc<UpstreamIdp>,
        validator: Arc<RemoteTokenValidator>,
    },
    /// Every authorization is approved for a fixed user (local mode)
    Local { user_id: String },
}

/// `/authorize` query parameters.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// `/callback` query parameters from the upstream IdP.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// `/token` form body.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TokenParams {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
}

/// An `/authorize` request that passed validation.
struct ValidatedAuthorize {
    client_id: String,
    redirect_uri: String,
    scope: String,
    state: Option<String>,
    code_challenge: String,
}

pub struct AuthorizationCoordinator {
    stores: AuthStores,
    authority: Authority,
    clients: ClientRegistry,
    http: reqwest::Client,
    default_scope: String,
}

impl AuthorizationCoordinator {
    pub fn new(
        stores: AuthStores,
        authority: Authority,
        clients: ClientRegistry,
        http: reqwest::Client,
        default_scope: String,
    ) -> Self {
        Self {
            stores,
            authority,
            clients,
            http,
            default_scope,
        }
    }

    pub fn stores(&self) -> &AuthStores {
        &self.stores
    }

    /// Whether `/callback` is part of this server's flow.
    pub fn uses_upstream(&self) -> bool {
        matches!(self.authority, Authority::Upstream { .. })
    }

    /// Handle `/authorize`. Returns the URL to redirect the user agent to.
    pub async fn authorize(&self, params: AuthorizeParams) -> Result<String, OAuthError> {
        let request = self.validate_authorize(params)?;

        match &self.authority {
            Authority::Upstream { idp, .. } => {
                let request_id = uuid::Uuid::new_v4().as_simple().to_string();
                let pkce = PkcePair::generate();
                let url = idp
                    .authorization_url(&request_id, &pkce.challenge)
                    .map_err(|e| {
                        warn!(error = %e, "cannot build upstream authorization URL");
                        OAuthError::server_error("Identity provider is misconfigured")
                    })?;

                info!(
                    client_id = %request.client_id,
                    request_id = %request_id,
                    "redirecting to upstream identity provider"
                );
                self.stores
                    .pending
                    .insert(PendingAuthRequest {
                        request_id,
                        client_id: request.client_id,
                        redirect_uri: request.redirect_uri,
                        scope: request.scope,
                        state: request.state,
                        code_challenge: request.code_challenge,
                        code_challenge_method: PKCE_METHOD_S256.to_string(),
                        expires_at: expires_in(PENDING_REQUEST_TTL),
                        external_code_verifier: pkce.verifier,
                        external_code_challenge: pkce.challenge,
                    })
                    .await;
                Ok(url)
            }
            Authority::Local { user_id } => {
                let code = random_token("");
                let redirect = redirect_to(
                    &request.redirect_uri,
                    &[("code", code.as_str())],
                    request.state.as_deref(),
                )?;
                info!(
                    client_id = %request.client_id,
                    user_id = %user_id,
                    "authorization approved locally"
                );
                self.stores
                    .grants
                    .store_authorization_code(
                        code,
                        AuthorizationGrant {
                            client_id: request.client_id,
                            redirect_uri: request.redirect_uri,
                            scope: request.scope,
                            code_challenge: request.code_challenge,
                            code_challenge_method: PKCE_METHOD_S256.to_string(),
                            expires_at: expires_in(AUTHORIZATION_CODE_TTL),
                            user_id: Some(user_id.clone()),
                            external_tokens: None,
                        },
                    )
                    .await;
                Ok(redirect)
            }
        }
    }

    fn validate_authorize(&self, params: AuthorizeParams) -> Result<ValidatedAuthorize, OAuthError> {
        match params.response_type.as_deref() {
            None | Some("") => return Err(OAuthError::invalid_request("response_type is required")),
            Some("code") => {}
            Some(other) => {
                return Err(OAuthError::new(
                    ErrorKind::UnsupportedResponseType,
                    format!("Unsupported response_type: {other}"),
                ));
            }
        }

        let client_id = required(params.client_id, "client_id")?;
        let redirect_uri = required(params.redirect_uri, "redirect_uri")?;
        let parsed = Url::parse(&redirect_uri)
            .map_err(|_| OAuthError::invalid_request("redirect_uri must be an absolute URL"))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(OAuthError::invalid_request(
                "redirect_uri must use http or https",
            ));
        }
        self.clients.check_redirect_uri(&client_id, &redirect_uri)?;

        let code_challenge = params
            .code_challenge
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("code_challenge is required (PKCE)"))?;
        if params.code_challenge_method.as_deref() != Some(PKCE_METHOD_S256) {
            return Err(OAuthError::invalid_request(
                "code_challenge_method must be S256",
            ));
        }

        Ok(ValidatedAuthorize {
            client_id,
            redirect_uri,
            scope: params
                .scope
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| self.default_scope.clone()),
            state: params.state,
            code_challenge,
        })
    }

    /// Handle the upstream IdP's redirect to `/callback`.
    ///
    /// Returns the URL to redirect the user agent to: the client's original
    /// `redirect_uri` with either a fresh code or the IdP's error.
    pub async fn callback(&self, params: CallbackParams) -> Result<String, OAuthError> {
        let Authority::Upstream { idp, validator } = &self.authority else {
            return Err(OAuthError::invalid_request(
                "callback is only used with an upstream identity provider",
            ));
        };

        let request_id = required(params.state, "state")?;
        let pending = self
            .stores
            .pending
            .get(&request_id)
            .await
            .ok_or_else(|| OAuthError::invalid_request("Unknown or expired authorization request"))?;

        if let Some(error) = params.error {
            warn!(
                client_id = %pending.client_id,
                error = %error,
                "upstream identity provider returned an error"
            );
            self.stores.pending.remove(&request_id).await;
            let mut query = vec![("error", error.as_str())];
            if let Some(description) = params.error_description.as_deref() {
                query.push(("error_description", description));
            }
            return redirect_to(&pending.redirect_uri, &query, pending.state.as_deref());
        }

        let code = required(params.code, "code")?;
        let external = idp
            .exchange_code(&self.http, &code, &pending.external_code_verifier)
            .await
            .map_err(|e| {
                warn!(client_id = %pending.client_id, error = %e, "upstream code exchange failed");
                OAuthError::server_error("Failed to exchange code with identity provider")
            })?;

        let identity = validator.validate_token(&external.access_token).await;
        let user_id = if identity.valid {
            identity.user_id
        } else {
            debug!(
                reason = identity.error.as_deref().unwrap_or("unknown"),
                "could not resolve user from upstream token"
            );
            None
        };

        if self.stores.pending.remove(&request_id).await.is_none() {
            return Err(OAuthError::invalid_request(
                "Authorization request already completed",
            ));
        }

        let code = random_token("");
        let redirect = redirect_to(
            &pending.redirect_uri,
            &[("code", code.as_str())],
            pending.state.as_deref(),
        )?;
        info!(
            client_id = %pending.client_id,
            user_id = user_id.as_deref().unwrap_or("-"),
            "upstream authorization completed"
        );
        self.stores
            .grants
            .store_authorization_code(
                code,
                AuthorizationGrant {
                    client_id: pending.client_id,
                    redirect_uri: pending.redirect_uri,
                    scope: pending.scope,
                    code_challenge: pending.code_challenge,
                    code_challenge_method: pending.code_challenge_method,
                    expires_at: expires_in(AUTHORIZATION_CODE_TTL),
                    user_id,
                    external_tokens: Some(external),
                },
            )
            .await;
        Ok(redirect)
    }

    /// Handle `/token`.
    pub async fn token(&self, params: TokenParams) -> Result<IssuedToken, OAuthError> {
        match params.grant_type.as_deref() {
            Some("authorization_code") => {
                let code = required(params.code, "code")?;
                let redirect_uri = required(params.redirect_uri, "redirect_uri")?;
                let client_id = required(params.client_id, "client_id")?;
                let code_verifier = required(params.code_verifier, "code_verifier")?;
                self.clients.check_client(&client_id)?;

                self.stores
                    .grants
                    .exchange_authorization_code(&code, &code_verifier, &client_id, &redirect_uri)
                    .await
                    .ok_or_else(|| {
                        OAuthError::invalid_grant(
                            "Invalid, expired or already used authorization code",
                        )
                    })
            }
            Some("refresh_token") => {
                let refresh_token = required(params.refresh_token, "refresh_token")?;
                let client_id = required(params.client_id, "client_id")?;
                self.clients.check_client(&client_id)?;

                self.stores
                    .tokens
                    .refresh(&refresh_token, &client_id)
                    .await
                    .ok_or_else(|| OAuthError::invalid_grant("Invalid or expired refresh token"))
            }
            Some("") | None => Err(OAuthError::invalid_request("grant_type is required")),
            Some(other) => Err(OAuthError::new(
                ErrorKind::UnsupportedGrantType,
                format!("Unsupported grant_type: {other}"),
            )),
        }
    }

    /// Handle `/introspect` for tokens minted by this server.
    pub async fn introspect(&self, token: &str) -> IntrospectionResponse {
        self.stores.tokens.introspect(token).await
    }

    /// Handle `/revoke`. Unknown tokens are not an error (RFC 7009).
    pub async fn revoke(&self, token: &str) {
        if self.stores.tokens.revoke(token).await {
            info!("token revoked");
        } else {
            debug!("revocation requested for unknown token");
        }
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, OAuthError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::invalid_request(format!("{name} is required")))
}

/// Append `params` (and `state`, when present) to a client redirect URI.
fn redirect_to(
    base: &str,
    params: &[(&str, &str)],
    state: Option<&str>,
) -> Result<String, OAuthError> {
    let mut url = Url::parse(base)
        .map_err(|_| OAuthError::invalid_request("redirect_uri must be an absolute URL"))?;
    {
        let mut query = url.query_pairs_mut();
        for (name, value) in params {
            query.append_pair(name, value);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url.into())
}
