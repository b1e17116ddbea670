//! Webhook authenticity check.
//!
//! Inbound requests are signed `v0=hex(HMAC-SHA256(secret, "v0:{ts}:{body}"))`.
//! Requests older than the tolerance window, or whose signature does not
//! match, are rejected before any processing.

use crate::chat::ChatError;
use crate::config::constants::SIGNATURE_TOLERANCE_SECS;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub struct SignatureVerifier {
    signing_secret: String,
}

impl SignatureVerifier {
    pub fn new(signing_secret: String) -> Self {
        Self { signing_secret }
    }

    /// Verify an inbound webhook. `now_epoch` is the current time in Unix
    /// seconds, injected so the replay window is testable.
    pub fn verify(
        &self,
        timestamp: &str,
        signature: &str,
        body: &[u8],
        now_epoch: i64,
    ) -> Result<(), ChatError> {
        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| ChatError::StaleTimestamp)?;
        if (now_epoch - sent_at).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(ChatError::StaleTimestamp);
        }

        let expected = self.compute(timestamp, body);
        if constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            Ok(())
        } else {
            Err(ChatError::SignatureInvalid)
        }
    }

    pub fn compute(&self, timestamp: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.signing_secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(b"v0:");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        let digest = mac.finalize().into_bytes();
        let mut out = String::with_capacity(3 + digest.len() * 2);
        out.push_str("v0=");
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
