//! OAuth 2.1 authorization for MCP servers
//!
//! Authorization-code issuance with mandatory PKCE, bearer-token validation
//! and an upstream-IdP proxy flow. The library has no dependency on the
//! server binary; every store is in memory and explicitly constructed.
//!
//! Proxy flow:
//! 1. Client calls `/authorize` with its own PKCE challenge
//! 2. `AuthorizationCoordinator::authorize` stores a `PendingAuthRequest`
//!    and redirects to the IdP with a second, server-owned PKCE pair
//! 3. IdP redirects to `/callback`; `AuthorizationCoordinator::callback`
//!    exchanges the IdP code and mints this server's own code
//! 4. Client calls `/token`; `GrantStore::exchange_authorization_code`
//!    checks the client's verifier and issues an access token
//! 5. Protected requests are checked through a `TokenValidator`

pub mod clients;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod grants;
pub mod jwks;
pub mod metadata;
pub mod pending;
pub mod pkce;
pub mod stores;
pub mod tokens;
pub mod types;
pub mod upstream;
pub mod validator;

#[cfg(test)]
mod test_support;

pub use clients::ClientRegistry;
pub use constants::*;
pub use coordinator::{
    Authority, AuthorizationCoordinator, AuthorizeParams, CallbackParams, TokenParams,
};
pub use error::{Error, ErrorKind, OAuthError, Result};
pub use grants::{AuthorizationGrant, GrantStore};
pub use metadata::{AuthorizationServerMetadata, ProtectedResourceMetadata, resource_metadata_url};
pub use pending::{PendingAuthRequest, PendingRequestStore};
pub use pkce::{PkcePair, compute_challenge, generate_verifier, verify_challenge};
pub use stores::{AuthStores, SweepReport, SweepTask, sweep_once};
pub use tokens::{AccessTokenRecord, AccessTokenStore, RefreshTokenRecord, TokenSubject};
pub use types::{Audience, ExternalTokens, IntrospectionResponse, IssuedToken};
pub use upstream::UpstreamIdp;
pub use validator::{RemoteTokenValidator, TokenValidationResult, TokenValidator};
