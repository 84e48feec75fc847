//! OAuth lifetimes and token formats
//!
//! Lifetimes are fixed by the authorization flow, not by deployment. The
//! access/refresh token lifetimes here are defaults; the server config can
//! override them.

use std::time::Duration;

/// Lifetime of a pending proxy authorization (authorize → IdP → callback).
pub const PENDING_REQUEST_TTL: Duration = Duration::from_secs(600);

/// Lifetime of an authorization code before it must be exchanged.
pub const AUTHORIZATION_CODE_TTL: Duration = Duration::from_secs(600);

/// Default access token lifetime.
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Default refresh token lifetime (30 days).
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Default interval between expired-record sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Prefix for access tokens minted by this server.
pub const ACCESS_TOKEN_PREFIX: &str = "mcp_at_";

/// Prefix for refresh tokens minted by this server.
pub const REFRESH_TOKEN_PREFIX: &str = "mcp_rt_";

/// The only PKCE method accepted anywhere in the flow.
pub const PKCE_METHOD_S256: &str = "S256";

/// How long fetched signing keys are reused before a refetch.
pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(600);

/// Minimum spacing between refetches triggered by an unknown `kid`.
pub const JWKS_MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(30);
