//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The upstream client secret is loaded from OAUTH_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly.

use common::Secret;
use mcp_oauth::{ClientRegistry, UpstreamIdp};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var holding the upstream client secret
pub const CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Externally visible base URL; issuer and metadata URLs derive from it
    pub public_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// How requests are authorized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// No authorization; every request is served
    #[default]
    Disabled,
    /// Validate tokens issued by an external IdP; issue nothing
    ResourceServer,
    /// Authorization server fronting an external IdP
    Proxy,
    /// Authorization server that approves a fixed development user
    Local,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Disabled => "disabled",
            AuthMode::ResourceServer => "resource_server",
            AuthMode::Proxy => "proxy",
            AuthMode::Local => "local",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub local_user: Option<String>,
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            scopes: default_scopes(),
            access_token_ttl_secs: default_access_token_ttl(),
            refresh_token_ttl_secs: default_refresh_token_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            local_user: None,
            clients: Vec::new(),
            upstream: None,
        }
    }
}

impl AuthConfig {
    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Registered clients; empty means any client may authorize.
    pub fn client_registry(&self) -> ClientRegistry {
        let mut registry = ClientRegistry::open();
        for client in &self.clients {
            registry.register(client.client_id.clone(), client.redirect_uris.clone());
        }
        registry
    }
}

/// A pre-registered OAuth client
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub redirect_uris: Vec<String>,
}

/// External identity provider
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    pub issuer: String,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to OAUTH_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl UpstreamConfig {
    /// Build the IdP client config. The IdP redirects back to
    /// `{public_url}/callback`.
    pub fn to_idp(&self, public_url: &str) -> UpstreamIdp {
        let issuer = self.issuer.trim_end_matches('/');
        let or_default = |explicit: &Option<String>, path: &str| {
            explicit
                .clone()
                .unwrap_or_else(|| format!("{issuer}{path}"))
        };
        UpstreamIdp {
            issuer: issuer.to_string(),
            authorization_endpoint: or_default(&self.authorization_endpoint, "/authorize"),
            token_endpoint: or_default(&self.token_endpoint, "/token"),
            introspection_endpoint: or_default(&self.introspection_endpoint, "/introspect"),
            jwks_uri: or_default(&self.jwks_uri, "/.well-known/jwks.json"),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            audience: self.audience.clone(),
            scopes: self.scopes.clone(),
            redirect_uri: format!("{}/callback", public_url.trim_end_matches('/')),
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_scopes() -> Vec<String> {
    vec!["mcp".to_string()]
}

fn default_access_token_ttl() -> u64 {
    3600
}

fn default_refresh_token_ttl() -> u64 {
    30 * 24 * 3600
}

fn default_sweep_interval() -> u64 {
    60
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::invalid(
            field,
            format!("must start with http:// or https://, got: {value}"),
        ))
    }
}

fn require_non_zero(field: &str, value: u64) -> common::Result<()> {
    if value == 0 {
        Err(common::Error::invalid(field, "must be greater than 0"))
    } else {
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. OAUTH_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;

        if let Some(upstream) = config.auth.upstream.as_mut() {
            upstream.client_secret = Secret::from_env_or_file(
                CLIENT_SECRET_ENV,
                upstream.client_secret_file.as_deref(),
            )?;
        }

        Ok(config)
    }

    /// Parse and validate TOML without touching the environment.
    pub fn parse(contents: &str) -> common::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("server.public_url", &self.server.public_url)?;
        require_non_zero("server.max_connections", self.server.max_connections as u64)?;

        let auth = &self.auth;
        require_non_zero("auth.access_token_ttl_secs", auth.access_token_ttl_secs)?;
        require_non_zero("auth.refresh_token_ttl_secs", auth.refresh_token_ttl_secs)?;
        require_non_zero("auth.sweep_interval_secs", auth.sweep_interval_secs)?;

        for client in &auth.clients {
            if client.redirect_uris.is_empty() {
                return Err(common::Error::invalid(
                    "auth.clients.redirect_uris",
                    format!("client {} has no redirect URIs", client.client_id),
                ));
            }
            for uri in &client.redirect_uris {
                require_http_url("auth.clients.redirect_uris", uri)?;
            }
        }

        if let Some(upstream) = &auth.upstream {
            require_http_url("auth.upstream.issuer", &upstream.issuer)?;
            let endpoints = [
                ("auth.upstream.authorization_endpoint", &upstream.authorization_endpoint),
                ("auth.upstream.token_endpoint", &upstream.token_endpoint),
                ("auth.upstream.introspection_endpoint", &upstream.introspection_endpoint),
                ("auth.upstream.jwks_uri", &upstream.jwks_uri),
            ];
            for (field, value) in endpoints {
                if let Some(url) = value {
                    require_http_url(field, url)?;
                }
            }
        }

        match auth.mode {
            AuthMode::ResourceServer | AuthMode::Proxy if auth.upstream.is_none() => {
                Err(common::Error::Config(format!(
                    "auth.mode = \"{}\" requires an [auth.upstream] section",
                    auth.mode.as_str()
                )))
            }
            AuthMode::Local if auth.local_user.as_deref().is_none_or(str::is_empty) => Err(
                common::Error::Config("auth.mode = \"local\" requires auth.local_user".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("mcp-auth-server.toml")
    }
}
