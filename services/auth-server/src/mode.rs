//! Auth mode selection
//!
//! Turns the `[auth]` config into the pieces the router needs: the bearer
//! validator, the authorization coordinator (when this server issues its
//! own tokens) and the store sweep task.
//!
//! | mode              | validator               | coordinator        | sweep |
//! |-------------------|-------------------------|--------------------|-------|
//! | `disabled`        | none                    | none               | no    |
//! | `resource_server` | remote (JWT/introspect) | none               | no    |
//! | `proxy`           | own access tokens       | upstream authority | yes   |
//! | `local`           | own access tokens       | local authority    | yes   |

use std::sync::Arc;

use mcp_oauth::{
    AuthStores, Authority, AuthorizationCoordinator, AuthorizationServerMetadata,
    ProtectedResourceMetadata, RemoteTokenValidator, SweepTask, TokenValidator,
    resource_metadata_url,
};
use tracing::info;

use crate::config::{AuthMode, Config};

/// Everything request handlers need to authorize requests.
pub struct AuthRuntime {
    pub mode: AuthMode,
    /// Externally visible base URL, no trailing slash
    pub public_url: String,
    pub scopes: Vec<String>,
    pub validator: Option<Arc<dyn TokenValidator>>,
    pub coordinator: Option<Arc<AuthorizationCoordinator>>,
    /// Issuer advertised in the protected resource metadata
    pub authorization_server: Option<String>,
}

impl AuthRuntime {
    /// A runtime that authorizes nothing.
    pub fn disabled(public_url: &str) -> Self {
        Self {
            mode: AuthMode::Disabled,
            public_url: public_url.trim_end_matches('/').to_string(),
            scopes: Vec::new(),
            validator: None,
            coordinator: None,
            authorization_server: None,
        }
    }

    pub fn resource_metadata_url(&self) -> String {
        resource_metadata_url(&self.public_url)
    }

    /// RFC 9728 document, when bearer tokens are required.
    pub fn protected_resource_metadata(&self) -> Option<ProtectedResourceMetadata> {
        let issuer = self.authorization_server.as_deref()?;
        Some(ProtectedResourceMetadata::new(
            &self.public_url,
            issuer,
            &self.scopes,
        ))
    }

    /// RFC 8414 document, when this server issues its own tokens.
    pub fn authorization_server_metadata(&self) -> Option<AuthorizationServerMetadata> {
        self.coordinator.as_ref()?;
        Some(AuthorizationServerMetadata::for_base_url(
            &self.public_url,
            &self.scopes,
        ))
    }
}

/// The runtime plus the sweep task that must be stopped at shutdown.
pub struct ModeSelection {
    pub runtime: Arc<AuthRuntime>,
    pub sweep: Option<SweepTask>,
}

/// Build the auth runtime for the configured mode.
///
/// Must be called inside a tokio runtime: the proxy and local modes spawn
/// the store sweep task.
pub fn select(config: &Config, http: reqwest::Client) -> ModeSelection {
    let auth = &config.auth;
    let public_url = config.server.public_url.trim_end_matches('/').to_string();
    let mut runtime = AuthRuntime::disabled(&public_url);
    runtime.mode = auth.mode;
    runtime.scopes = auth.scopes.clone();

    let upstream = auth
        .upstream
        .as_ref()
        .map(|u| Arc::new(u.to_idp(&public_url)));

    let authority = match (auth.mode, upstream) {
        (AuthMode::Disabled, _) => None,
        (AuthMode::ResourceServer, Some(idp)) => {
            runtime.authorization_server = Some(idp.issuer.clone());
            runtime.validator = Some(Arc::new(RemoteTokenValidator::new(idp, http.clone())));
            None
        }
        (AuthMode::Proxy, Some(idp)) => {
            let validator = Arc::new(RemoteTokenValidator::new(idp.clone(), http.clone()));
            Some(Authority::Upstream { idp, validator })
        }
        (AuthMode::Local, _) => Some(Authority::Local {
            user_id: auth.local_user.clone().unwrap_or_default(),
        }),
        // Rejected by config validation
        (AuthMode::ResourceServer | AuthMode::Proxy, None) => None,
    };

    let mut sweep = None;
    if let Some(authority) = authority {
        let stores = AuthStores::new(auth.access_token_ttl(), auth.refresh_token_ttl());
        sweep = Some(SweepTask::spawn(stores.clone(), auth.sweep_interval()));

        let validator: Arc<dyn TokenValidator> = stores.tokens.clone();
        runtime.validator = Some(validator);
        runtime.authorization_server = Some(public_url.clone());
        runtime.coordinator = Some(Arc::new(AuthorizationCoordinator::new(
            stores,
            authority,
            auth.client_registry(),
            http,
            auth.scopes.join(" "),
        )));
    }

    info!(
        mode = auth.mode.as_str(),
        issues_tokens = runtime.coordinator.is_some(),
        authorization_server = runtime.authorization_server.as_deref().unwrap_or("-"),
        "auth mode selected"
    );

    ModeSelection {
        runtime: Arc::new(runtime),
        sweep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auth: &str) -> Config {
        Config::parse(&format!(
            r#"
[server]
listen_addr = "127.0.0.1:3000"
public_url = "http://localhost:3000/"

{auth}
"#
        ))
        .unwrap()
    }

    const UPSTREAM: &str = r#"
[auth.upstream]
issuer = "https://idp.example.com"
client_id = "mcp-server"
"#;

    #[tokio::test]
    async fn disabled_mode_has_no_auth() {
        let selection = select(&config(""), reqwest::Client::new());
        let runtime = &selection.runtime;
        assert_eq!(runtime.mode, AuthMode::Disabled);
        assert!(runtime.validator.is_none());
        assert!(runtime.coordinator.is_none());
        assert!(runtime.protected_resource_metadata().is_none());
        assert!(runtime.authorization_server_metadata().is_none());
        assert!(selection.sweep.is_none());
    }

    #[tokio::test]
    async fn resource_server_validates_only() {
        let selection = select(
            &config(&format!("[auth]\nmode = \"resource_server\"\n{UPSTREAM}")),
            reqwest::Client::new(),
        );
        let runtime = &selection.runtime;
        assert!(runtime.validator.is_some());
        assert!(runtime.coordinator.is_none());
        assert!(selection.sweep.is_none());

        let prm = runtime.protected_resource_metadata().unwrap();
        assert_eq!(prm.resource, "http://localhost:3000");
        assert_eq!(prm.authorization_servers, vec!["https://idp.example.com"]);
        assert!(runtime.authorization_server_metadata().is_none());
    }

    #[tokio::test]
    async fn proxy_mode_issues_tokens_and_sweeps() {
        let selection = select(
            &config(&format!("[auth]\nmode = \"proxy\"\n{UPSTREAM}")),
            reqwest::Client::new(),
        );
        let runtime = selection.runtime.clone();
        assert!(runtime.validator.is_some());
        assert!(runtime.coordinator.as_ref().unwrap().uses_upstream());

        let prm = runtime.protected_resource_metadata().unwrap();
        assert_eq!(prm.authorization_servers, vec!["http://localhost:3000"]);
        let asm = runtime.authorization_server_metadata().unwrap();
        assert_eq!(asm.issuer, "http://localhost:3000");
        assert_eq!(asm.token_endpoint, "http://localhost:3000/token");

        selection.sweep.unwrap().shutdown().await;
    }

    #[tokio::test]
    async fn local_mode_uses_local_authority() {
        let selection = select(
            &config("[auth]\nmode = \"local\"\nlocal_user = \"dev-user\"\n"),
            reqwest::Client::new(),
        );
        let runtime = selection.runtime.clone();
        assert!(!runtime.coordinator.as_ref().unwrap().uses_upstream());
        assert_eq!(
            runtime.resource_metadata_url(),
            "http://localhost:3000/.well-known/oauth-protected-resource"
        );
        selection.sweep.unwrap().shutdown().await;
    }
}
