//! Access and refresh tokens minted by this server
//!
//! Tokens are opaque random strings with a fixed prefix, stored in memory
//! with an absolute expiry. Expired entries are deleted when touched and by
//! the periodic sweep. A tokio Mutex per map serializes every
//! check-then-mutate sequence; no lock is held across an await on anything
//! else.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{ACCESS_TOKEN_PREFIX, REFRESH_TOKEN_PREFIX};
use crate::types::{
    ExternalTokens, IntrospectionResponse, IssuedToken, expiry_after, now_millis, random_token,
};
use crate::validator::TokenValidationResult;

/// An access token issued by the server.
#[derive(Debug, Clone)]
pub struct AccessTokenRecord {
    pub user_id: String,
    pub client_id: String,
    pub scope: String,
    /// Expiration as unix timestamp in milliseconds
    pub expires_at: u64,
    pub external_tokens: Option<ExternalTokens>,
}

/// A refresh token. Rotated on every use.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub user_id: String,
    pub client_id: String,
    pub scope: String,
    pub expires_at: u64,
    pub external_tokens: Option<ExternalTokens>,
}

/// What a token is issued for. Shared by code exchange and refresh.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: String,
    pub client_id: String,
    pub scope: String,
    pub external_tokens: Option<ExternalTokens>,
}

pub struct AccessTokenStore {
    access: Mutex<HashMap<String, AccessTokenRecord>>,
    refresh: Mutex<HashMap<String, RefreshTokenRecord>>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AccessTokenStore {
    pub fn new(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access: Mutex::new(HashMap::new()),
            refresh: Mutex::new(HashMap::new()),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Mint an access token and a refresh token for `subject`.
    pub async fn issue(&self, subject: TokenSubject) -> IssuedToken {
        let now = now_millis();
        let access_token = random_token(ACCESS_TOKEN_PREFIX);
        let refresh_token = random_token(REFRESH_TOKEN_PREFIX);

        let record = AccessTokenRecord {
            user_id: subject.user_id.clone(),
            client_id: subject.client_id.clone(),
            scope: subject.scope.clone(),
            expires_at: expiry_after(now, self.access_ttl),
            external_tokens: subject.external_tokens.clone(),
        };
        let refresh_record = RefreshTokenRecord {
            user_id: subject.user_id,
            client_id: subject.client_id,
            scope: subject.scope.clone(),
            expires_at: expiry_after(now, self.refresh_ttl),
            external_tokens: subject.external_tokens,
        };

        info!(
            client_id = %record.client_id,
            user_id = %record.user_id,
            "issued access token"
        );
        self.access.lock().await.insert(access_token.clone(), record);
        self.refresh
            .lock()
            .await
            .insert(refresh_token.clone(), refresh_record);

        IssuedToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.as_secs(),
            scope: subject.scope,
            refresh_token: Some(refresh_token),
        }
    }

    /// Insert an access token record directly.
    pub async fn insert(&self, token: String, record: AccessTokenRecord) {
        self.access.lock().await.insert(token, record);
    }

    /// Look up a live access token, deleting it if it has expired.
    pub async fn lookup(&self, token: &str) -> Option<AccessTokenRecord> {
        let mut access = self.access.lock().await;
        let record = access.get(token)?;
        if record.expires_at <= now_millis() {
            debug!("access token expired, removing");
            access.remove(token);
            return None;
        }
        Some(record.clone())
    }

    /// Validate a bearer token minted by this server.
    pub async fn validate_token(&self, token: &str) -> TokenValidationResult {
        let mut access = self.access.lock().await;
        let Some(record) = access.get(token) else {
            return TokenValidationResult::invalid("Invalid token");
        };
        if record.expires_at <= now_millis() {
            access.remove(token);
            return TokenValidationResult::invalid("Token expired");
        }
        TokenValidationResult::valid(Some(record.user_id.clone()), Some(record.scope.clone()))
    }

    /// RFC 7662 view of an access token.
    pub async fn introspect(&self, token: &str) -> IntrospectionResponse {
        match self.lookup(token).await {
            Some(record) => IntrospectionResponse {
                active: true,
                scope: Some(record.scope),
                client_id: Some(record.client_id),
                sub: Some(record.user_id),
                exp: Some(record.expires_at / 1000),
                ..Default::default()
            },
            None => IntrospectionResponse::inactive(),
        }
    }

    /// Redeem a refresh token for a new token pair.
    ///
    /// The presented refresh token is removed before the new pair is minted,
    /// so it can be used once. A token presented by a different client is
    /// left in place.
    pub async fn refresh(&self, refresh_token: &str, client_id: &str) -> Option<IssuedToken> {
        let record = {
            let mut refresh = self.refresh.lock().await;
            let Some(record) = refresh.get(refresh_token) else {
                warn!(client_id, "refresh token not found");
                return None;
            };
            if record.expires_at <= now_millis() {
                warn!(client_id, "refresh token expired");
                refresh.remove(refresh_token);
                return None;
            }
            if record.client_id != client_id {
                warn!(
                    client_id,
                    expected = %record.client_id,
                    "refresh token presented by a different client"
                );
                return None;
            }
            refresh.remove(refresh_token)?
        };

        Some(
            self.issue(TokenSubject {
                user_id: record.user_id,
                client_id: record.client_id,
                scope: record.scope,
                external_tokens: record.external_tokens,
            })
            .await,
        )
    }

    /// Remove an access or refresh token. Returns whether anything was removed.
    pub async fn revoke(&self, token: &str) -> bool {
        if self.access.lock().await.remove(token).is_some() {
            debug!("revoked access token");
            return true;
        }
        if self.refresh.lock().await.remove(token).is_some() {
            debug!("revoked refresh token");
            return true;
        }
        false
    }

    /// Remove every token that expired at or before `now`.
    pub async fn sweep_expired(&self, now: u64) -> usize {
        let mut removed = 0;
        {
            let mut access = self.access.lock().await;
            let before = access.len();
            access.retain(|_, r| r.expires_at > now);
            removed += before - access.len();
        }
        {
            let mut refresh = self.refresh.lock().await;
            let before = refresh.len();
            refresh.retain(|_, r| r.expires_at > now);
            removed += before - refresh.len();
        }
        removed
    }

    /// Number of live-or-unswept access tokens.
    pub async fn len(&self) -> usize {
        self.access.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of live-or-unswept refresh tokens.
    pub async fn refresh_len(&self) -> usize {
        self.refresh.lock().await.len()
    }
}
