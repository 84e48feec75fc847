//! Authorization codes awaiting exchange
//!
//! A grant binds an authorization code to the client that requested it: the
//! client's PKCE challenge, its `client_id` and its `redirect_uri`. Exchange
//! checks all three and removes the grant under the same lock acquisition,
//! so a code can be redeemed once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::pkce::verify_challenge;
use crate::tokens::{AccessTokenStore, TokenSubject};
use crate::types::{ExternalTokens, IssuedToken, now_millis};

/// An authorization code's binding, captured at issuance.
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    /// Expiration as unix timestamp in milliseconds
    pub expires_at: u64,
    pub user_id: Option<String>,
    pub external_tokens: Option<ExternalTokens>,
}

pub struct GrantStore {
    grants: Mutex<HashMap<String, AuthorizationGrant>>,
    tokens: Arc<AccessTokenStore>,
}

impl GrantStore {
    pub fn new(tokens: Arc<AccessTokenStore>) -> Self {
        Self {
            grants: Mutex::new(HashMap::new()),
            tokens,
        }
    }

    /// Store a grant under `code`, replacing any previous one.
    pub async fn store_authorization_code(&self, code: String, grant: AuthorizationGrant) {
        debug!(client_id = %grant.client_id, "stored authorization code");
        self.grants.lock().await.insert(code, grant);
    }

    /// Exchange an authorization code for an access token.
    ///
    /// Checks, in order: the code exists, it has not expired (an expired
    /// grant is deleted), `client_id` and `redirect_uri` match the grant,
    /// and the verifier's S256 challenge matches. Any failure returns `None`.
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        code_verifier: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Option<IssuedToken> {
        let grant = {
            let mut grants = self.grants.lock().await;
            let Some(grant) = grants.get(code) else {
                warn!(client_id, "authorization code not found");
                return None;
            };

            if grant.expires_at <= now_millis() {
                warn!(client_id, "authorization code expired");
                grants.remove(code);
                return None;
            }

            if grant.client_id != client_id || grant.redirect_uri != redirect_uri {
                warn!(
                    client_id,
                    redirect_uri,
                    expected_client_id = %grant.client_id,
                    "client or redirect_uri does not match authorization code"
                );
                return None;
            }

            if !verify_challenge(code_verifier, &grant.code_challenge) {
                warn!(client_id, "PKCE verification failed");
                return None;
            }

            grants.remove(code)?
        };

        let issued = self
            .tokens
            .issue(TokenSubject {
                user_id: grant
                    .user_id
                    .unwrap_or_else(|| grant.client_id.clone()),
                client_id: grant.client_id,
                scope: grant.scope,
                external_tokens: grant.external_tokens,
            })
            .await;
        info!(client_id, "authorization code exchanged");
        Some(issued)
    }

    /// Remove every grant that expired at or before `now`.
    pub async fn sweep_expired(&self, now: u64) -> usize {
        let mut grants = self.grants.lock().await;
        let before = grants.len();
        grants.retain(|_, g| g.expires_at > now);
        before - grants.len()
    }

    pub async fn len(&self) -> usize {
        self.grants.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
