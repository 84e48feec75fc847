//! Cached signing keys of the upstream issuer
//!
//! Keys are fetched on first use and reused for `JWKS_CACHE_TTL`. A token
//! whose `kid` is not in the cached set triggers one refetch, rate-limited
//! to one per `JWKS_MIN_REFETCH_INTERVAL`, so newly rotated keys are picked
//! up without letting unknown-kid tokens hammer the IdP.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::RwLock;
use tracing::debug;

use crate::constants::{JWKS_CACHE_TTL, JWKS_MIN_REFETCH_INTERVAL};
use crate::error::Result;
use crate::upstream::UpstreamIdp;

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

pub struct JwksCache {
    idp: Arc<UpstreamIdp>,
    client: reqwest::Client,
    cached: RwLock<Option<CachedKeys>>,
    ttl: Duration,
    min_refetch: Duration,
}

impl JwksCache {
    pub fn new(idp: Arc<UpstreamIdp>, client: reqwest::Client) -> Self {
        Self {
            idp,
            client,
            cached: RwLock::new(None),
            ttl: JWKS_CACHE_TTL,
            min_refetch: JWKS_MIN_REFETCH_INTERVAL,
        }
    }

    /// Find the signing key for `kid`.
    ///
    /// A token without a `kid` matches only when the set holds exactly one
    /// key. `Ok(None)` means the keys were fetched and none matched; `Err`
    /// means the keys could not be fetched.
    pub async fn find(&self, kid: Option<&str>) -> Result<Option<Jwk>> {
        {
            let cached = self.cached.read().await;
            if let Some(c) = cached.as_ref() {
                if c.fetched_at.elapsed() < self.ttl {
                    if let Some(jwk) = select(&c.keys, kid) {
                        return Ok(Some(jwk));
                    }
                    if c.fetched_at.elapsed() < self.min_refetch {
                        return Ok(None);
                    }
                }
            }
        }

        let keys = self.idp.fetch_jwks(&self.client).await?;
        debug!(keys = keys.keys.len(), "signing keys refreshed");
        let found = select(&keys, kid);
        *self.cached.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(found)
    }
}

fn select(keys: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    match kid {
        Some(kid) => keys.find(kid).cloned(),
        None if keys.keys.len() == 1 => keys.keys.first().cloned(),
        None => None,
    }
}
