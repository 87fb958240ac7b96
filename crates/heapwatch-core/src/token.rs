// crates/heapwatch-core/src/token.rs
// ============================================================================
// Module: Heapwatch Token Service
// Description: Run-scoped bearer tokens and the shared admin secret.
// Purpose: Issue and validate short-lived HMAC-signed tokens, statelessly.
// Dependencies: base64, hmac, serde, serde_json, sha2, subtle, thiserror
// ============================================================================

//! ## Overview
//! A token is `base64url(claims_json) + "." + hex(hmac_sha256(claims_json))`,
//! signed with a server-side secret supplied at construction. Validation
//! recomputes the MAC over the decoded payload and compares in constant time,
//! then checks expiry and run scope. There is no revocation and no
//! persistence: a token stays valid for its run until expiry.
//!
//! Admin authentication is a separate shared secret compared in constant
//! time against a request header.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::clock;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Token lifetime: two hours, in epoch milliseconds.
pub const TOKEN_TTL_MILLIS: i64 = 2 * 60 * 60 * 1_000;

/// HMAC-SHA256 keyed by the token secret.
type TokenMac = Hmac<Sha256>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token generation and validation errors. All validation variants collapse
/// to HTTP 401 at the API boundary; the variant is kept for audit logging.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Token structure could not be decoded.
    #[error("malformed token: {0}")]
    Malformed(&'static str),
    /// MAC did not match the payload.
    #[error("token signature mismatch")]
    Signature,
    /// Embedded expiry is in the past.
    #[error("token expired")]
    Expired,
    /// Token was issued for a different run.
    #[error("token run_id mismatch")]
    RunMismatch,
    /// Claims payload could not be serialized at generation time.
    #[error("token serialization failed: {0}")]
    Serialize(String),
}

// ============================================================================
// SECTION: Claims
// ============================================================================

/// Data embedded in a token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Run the token is scoped to.
    pub run_id: String,
    /// Expiry as epoch millis.
    pub expires_at: i64,
    /// Issuance time as epoch millis.
    pub created_at: i64,
}

/// A freshly issued token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Opaque bearer token string.
    pub token: String,
    /// Expiry as epoch millis.
    pub expires_at: i64,
}

// ============================================================================
// SECTION: Token Service
// ============================================================================

/// Stateless issuer/validator for run-scoped bearer tokens.
pub struct TokenService {
    /// Server-side signing secret bytes.
    secret: Vec<u8>,
}

impl TokenService {
    /// Builds a token service from the configured signing secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    /// Issues a token scoped to `run_id`, expiring [`TOKEN_TTL_MILLIS`] from
    /// now.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Serialize`] when the claims payload cannot be
    /// encoded; this is fatal to the caller, not retryable.
    pub fn generate(&self, run_id: &str) -> Result<IssuedToken, TokenError> {
        self.generate_at(run_id, clock::unix_millis_now())
    }

    /// Issues a token with an explicit issuance time. Deterministic variant
    /// used by validation tests.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Serialize`] when the claims payload cannot be
    /// encoded.
    pub fn generate_at(&self, run_id: &str, now_millis: i64) -> Result<IssuedToken, TokenError> {
        let claims = TokenClaims {
            run_id: run_id.to_string(),
            expires_at: now_millis.saturating_add(TOKEN_TTL_MILLIS),
            created_at: now_millis,
        };
        let payload =
            serde_json::to_vec(&claims).map_err(|err| TokenError::Serialize(err.to_string()))?;
        let mac = self.mac_over(&payload)?;
        let token = format!("{}.{}", URL_SAFE.encode(&payload), hex_encode(&mac));
        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at,
        })
    }

    /// Validates a token against the run it claims to be scoped to.
    ///
    /// # Errors
    ///
    /// Returns the specific [`TokenError`] rejection reason.
    pub fn validate(&self, token: &str, run_id: &str) -> Result<(), TokenError> {
        self.validate_at(token, run_id, clock::unix_millis_now())
    }

    /// Validates a token at an explicit instant. Deterministic variant used
    /// by expiry tests.
    ///
    /// # Errors
    ///
    /// Returns the specific [`TokenError`] rejection reason.
    pub fn validate_at(
        &self,
        token: &str,
        run_id: &str,
        now_millis: i64,
    ) -> Result<(), TokenError> {
        let (payload_encoded, signature_hex) =
            token.split_once('.').ok_or(TokenError::Malformed("missing separator"))?;
        let payload = URL_SAFE
            .decode(payload_encoded)
            .map_err(|_| TokenError::Malformed("payload not base64"))?;
        let signature =
            hex_decode(signature_hex).ok_or(TokenError::Malformed("signature not hex"))?;
        let expected = self.mac_over(&payload)?;
        let matches: bool = expected.as_slice().ct_eq(&signature).into();
        if !matches {
            return Err(TokenError::Signature);
        }
        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|_| TokenError::Malformed("payload not claims json"))?;
        if now_millis > claims.expires_at {
            return Err(TokenError::Expired);
        }
        if claims.run_id != run_id {
            return Err(TokenError::RunMismatch);
        }
        Ok(())
    }

    /// Computes the HMAC over a payload.
    fn mac_over(&self, payload: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = TokenMac::new_from_slice(&self.secret)
            .map_err(|_| TokenError::Serialize("hmac key rejected".to_string()))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

// ============================================================================
// SECTION: Admin Secret
// ============================================================================

/// Shared secret gating admin cleanup operations.
pub struct AdminSecret {
    /// Configured secret bytes.
    secret: Vec<u8>,
}

impl AdminSecret {
    /// Builds the admin secret from configuration.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    /// Compares a provided header value against the secret in constant time.
    #[must_use]
    pub fn matches(&self, provided: &str) -> bool {
        self.secret.as_slice().ct_eq(provided.as_bytes()).into()
    }
}

// ============================================================================
// SECTION: Hex Helpers
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Decodes a lowercase or uppercase hex string; `None` on malformed input.
fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let digits = hex.as_bytes();
    let mut out = Vec::with_capacity(hex.len() / 2);
    for pair in digits.chunks_exact(2) {
        let high = hex_digit(pair[0])?;
        let low = hex_digit(pair[1])?;
        out.push((high << 4) | low);
    }
    Some(out)
}

/// Converts one ASCII hex digit to its value.
const fn hex_digit(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}
