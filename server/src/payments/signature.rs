//! Checkout signature scheme used by the gateway.
//!
//! The signature is the hex-encoded HMAC-SHA256 of `{order_id}|{payment_id}`
//! keyed with the merchant key secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, order_id: &str, payment_id: &str) -> HmacSha256 {
        // HMAC accepts keys of any length, including empty ones.
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        mac
    }

    /// Computes the signature the gateway would attach to this payment.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        hex::encode(self.mac(order_id, payment_id).finalize().into_bytes())
    }

    /// Constant-time check of a hex signature.
    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };
        self.mac(order_id, payment_id).verify_slice(&provided).is_ok()
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}
