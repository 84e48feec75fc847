//! Pending proxy authorizations
//!
//! Created when `/authorize` redirects the user agent to the external IdP,
//! keyed by the request id that travels as the IdP's `state` parameter.
//! Holds the client's original PKCE challenge alongside the server's own
//! verifier for the IdP leg.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use crate::types::now_millis;

#[derive(Debug, Clone)]
pub struct PendingAuthRequest {
    pub request_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    /// The client's own `state`, returned unchanged on the final redirect
    pub state: Option<String>,
    pub code_challenge: String,
    pub code_challenge_method: String,
    /// Expiration as unix timestamp in milliseconds
    pub expires_at: u64,
    pub external_code_verifier: String,
    pub external_code_challenge: String,
}

#[derive(Default)]
pub struct PendingRequestStore {
    requests: Mutex<HashMap<String, PendingAuthRequest>>,
}

impl PendingRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, request: PendingAuthRequest) {
        debug!(client_id = %request.client_id, "stored pending authorization");
        self.requests
            .lock()
            .await
            .insert(request.request_id.clone(), request);
    }

    /// Look up a live pending request, deleting it if it has expired.
    pub async fn get(&self, request_id: &str) -> Option<PendingAuthRequest> {
        let mut requests = self.requests.lock().await;
        let request = requests.get(request_id)?;
        if request.expires_at <= now_millis() {
            debug!("pending authorization expired, removing");
            requests.remove(request_id);
            return None;
        }
        Some(request.clone())
    }

    /// Consume a pending request. `None` if another caller got there first.
    pub async fn remove(&self, request_id: &str) -> Option<PendingAuthRequest> {
        self.requests.lock().await.remove(request_id)
    }

    pub async fn sweep_expired(&self, now: u64) -> usize {
        let mut requests = self.requests.lock().await;
        let before = requests.len();
        requests.retain(|_, r| r.expires_at > now);
        before - requests.len()
    }

    pub async fn len(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
