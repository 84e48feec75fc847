//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Used on both legs of the proxy flow: the MCP client's challenge is
//! verified at `/token`, and the server generates its own independent pair
//! for the exchange with the external IdP. Only the S256 method exists here.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Generate a cryptographically random PKCE code verifier.
///
/// 64 random bytes encoded as URL-safe base64 (no padding) gives 86
/// characters, inside RFC 7636's 43-128 character range.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Check a presented verifier against a stored S256 challenge.
///
/// Comparison runs over every byte regardless of where the first mismatch is.
pub fn verify_challenge(verifier: &str, challenge: &str) -> bool {
    let derived = compute_challenge(verifier);
    let (a, b) = (derived.as_bytes(), challenge.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// A verifier together with its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair.
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}
