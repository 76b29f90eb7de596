//! Keyed-hash verification of payment messages.
//!
//! Both confirmation channels hand the verifier the exact bytes the gateway
//! signed: the client-verify channel signs `"{gateway_order_id}|{gateway_payment_id}"`
//! with the gateway key secret, the webhook channel signs the raw delivery
//! body with the webhook secret. Callers must preserve those bytes untouched.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Stateless HMAC-SHA256 verifier bound to one shared secret.
///
/// Constructed with the secret injected from configuration; a verifier with
/// no secret fails every call with `ConfigurationError` rather than falling
/// back to an insecure default.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: Option<String>,
}

impl SignatureVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Computes the hex-encoded HMAC-SHA256 of `payload`.
    pub fn sign(&self, payload: &[u8]) -> Result<String, ServiceError> {
        let secret = self.secret()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("hmac init: {}", e)))?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Recomputes the keyed hash over `payload` and compares it against
    /// `candidate` in constant time.
    pub fn verify(&self, payload: &[u8], candidate: &str) -> Result<(), ServiceError> {
        let expected = self.sign(payload)?;
        if constant_time_eq(expected.as_bytes(), candidate.as_bytes()) {
            Ok(())
        } else {
            Err(ServiceError::InvalidSignature)
        }
    }

    fn secret(&self) -> Result<&str, ServiceError> {
        self.secret.as_deref().ok_or_else(|| {
            ServiceError::ConfigurationError("signing secret is not configured".to_string())
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.iter().zip(b) {
        res |= x ^ y;
    }
    res == 0
}
