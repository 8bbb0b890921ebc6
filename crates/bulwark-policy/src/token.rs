//! Capability tokens and their HMAC signatures.
//!
//! The signature covers the canonical JSON of every field except the
//! signature itself:
//!
//! ```text
//! HMAC-SHA256(key, canonical_json({
//!     agent_id, expires_at, issued_at, parameters,
//!     token_id, tool_id, trust_level
//! }))
//! ```
//!
//! Because the parameters are part of the signed body, a client cannot
//! swap them after issuance without invalidating the token.

use std::fmt;

use bulwark_audit::TrustLevel;
use bulwark_registry::canonical_json;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{PolicyError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Length of randomly generated signing keys, in bytes.
pub const SIGNING_KEY_LEN: usize = 32;

/// A single-use, parameter-bound authorization to invoke one tool.
///
/// Opaque to transports: any change to a field breaks the signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub token_id: String,
    pub tool_id: String,
    pub agent_id: String,
    pub trust_level: TrustLevel,
    pub parameters: Value,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Hex-encoded HMAC-SHA256 over the other fields.
    pub signature: String,
}

#[derive(Serialize)]
struct SignedBody<'a> {
    token_id: &'a str,
    tool_id: &'a str,
    agent_id: &'a str,
    trust_level: TrustLevel,
    parameters: &'a Value,
    issued_at: &'a DateTime<Utc>,
    expires_at: &'a DateTime<Utc>,
}

impl CapabilityToken {
    /// Canonical bytes covered by the signature.
    pub fn signing_payload(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_value(SignedBody {
            token_id: &self.token_id,
            tool_id: &self.tool_id,
            agent_id: &self.agent_id,
            trust_level: self.trust_level,
            parameters: &self.parameters,
            issued_at: &self.issued_at,
            expires_at: &self.expires_at,
        })?;
        Ok(canonical_json(&body).into_bytes())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Signs and verifies tokens with a process-held HMAC key.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl TokenSigner {
    /// Uses `key` as the HMAC key. Keys shorter than 16 bytes are refused.
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        if key.len() < 16 {
            return Err(PolicyError::InvalidKey(format!(
                "key must be at least 16 bytes, got {}",
                key.len()
            )));
        }
        Ok(Self { key })
    }

    /// Decodes a hex-encoded key.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let key = hex::decode(hex_key.trim()).map_err(|e| PolicyError::InvalidKey(e.to_string()))?;
        Self::new(key)
    }

    /// Generates a fresh random key. Tokens signed with it do not survive
    /// a process restart.
    pub fn random() -> Self {
        let mut key = vec![0u8; SIGNING_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    fn mac(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| PolicyError::InvalidKey(e.to_string()))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Computes the hex signature for `token`.
    pub fn sign(&self, token: &CapabilityToken) -> Result<String> {
        Ok(hex::encode(self.mac(&token.signing_payload()?)?))
    }

    /// Fills in `token.signature`.
    pub fn seal(&self, token: &mut CapabilityToken) -> Result<()> {
        token.signature = self.sign(token)?;
        Ok(())
    }

    /// Constant-time signature check. Malformed signatures are invalid.
    pub fn verify(&self, token: &CapabilityToken) -> bool {
        let Ok(presented) = hex::decode(&token.signature) else {
            return false;
        };
        let Ok(expected) = token.signing_payload().and_then(|p| self.mac(&p)) else {
            return false;
        };
        if presented.len() != expected.len() {
            return false;
        }
        presented.as_slice().ct_eq(expected.as_slice()).into()
    }
}
