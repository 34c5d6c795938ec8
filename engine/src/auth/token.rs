//! Portal link token digests.
//!
//! Tokens are only handed out once, at registration. What is kept is an
//! HMAC-SHA256 digest keyed with a server secret, so a leaked store does
//! not leak usable tokens.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of generated tokens and secrets.
const TOKEN_BYTES: usize = 32;

/// Computes and verifies keyed token digests.
#[derive(Clone)]
pub struct TokenDigester {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenDigester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenDigester").finish_non_exhaustive()
    }
}

impl TokenDigester {
    /// Use a configured secret, falling back to a random per-process key.
    pub fn new(secret: Option<&str>) -> Self {
        match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => Self {
                key: secret.as_bytes().to_vec(),
            },
            None => {
                warn!("portal_token_secret_not_configured");
                Self::random()
            }
        }
    }

    pub fn random() -> Self {
        let mut key = vec![0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Generate a fresh bearer token.
    pub fn generate_token(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Hex digest of `token`.
    pub fn digest(&self, token: &str) -> String {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.key) {
            Ok(m) => m,
            Err(_) => return String::new(),
        };
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check `token` against a stored digest.
    pub fn verify(&self, token: &str, digest: &str) -> bool {
        if token.is_empty() || digest.is_empty() {
            return false;
        }
        constant_time_compare(&self.digest(token), digest)
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_unique_hex() {
        let digester = TokenDigester::random();
        let a = digester.generate_token();
        let b = digester.generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(hex::decode(&a).is_ok());
    }

    #[test]
    fn test_verify_round_trip() {
        let digester = TokenDigester::new(Some("server-secret"));
        let token = digester.generate_token();
        let digest = digester.digest(&token);
        assert!(digester.verify(&token, &digest));
        assert!(!digester.verify("other-token", &digest));
        assert!(!digester.verify("", &digest));
    }

    #[test]
    fn test_digest_depends_on_secret() {
        let a = TokenDigester::new(Some("one"));
        let b = TokenDigester::new(Some("two"));
        assert_ne!(a.digest("token"), b.digest("token"));
        assert_eq!(a.digest("token"), TokenDigester::new(Some("one")).digest("token"));
    }

    #[test]
    fn test_blank_secret_falls_back_to_random() {
        let a = TokenDigester::new(Some("   "));
        let b = TokenDigester::new(None);
        assert_ne!(a.digest("token"), b.digest("token"));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
