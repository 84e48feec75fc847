//! Static client registry
//!
//! An empty registry accepts any client (public clients, PKCE-only). Once a
//! client is registered, only registered clients and their exact redirect
//! URIs are accepted.

use std::collections::HashMap;

use crate::error::OAuthError;

#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Vec<String>>,
}

impl ClientRegistry {
    /// A registry that accepts every client.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client_id: impl Into<String>, redirect_uris: Vec<String>) {
        self.clients.insert(client_id.into(), redirect_uris);
    }

    pub fn is_open(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn check_client(&self, client_id: &str) -> Result<(), OAuthError> {
        if self.is_open() || self.clients.contains_key(client_id) {
            Ok(())
        } else {
            Err(OAuthError::invalid_client(format!(
                "Unknown client: {client_id}"
            )))
        }
    }

    pub fn check_redirect_uri(&self, client_id: &str, redirect_uri: &str) -> Result<(), OAuthError> {
        if self.is_open() {
            return Ok(());
        }
        self.check_client(client_id)?;
        let allowed = self
            .clients
            .get(client_id)
            .is_some_and(|uris| uris.iter().any(|u| u == redirect_uri));
        if allowed {
            Ok(())
        } else {
            Err(OAuthError::invalid_request(
                "redirect_uri is not registered for this client",
            ))
        }
    }
}
