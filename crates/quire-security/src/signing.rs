// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription secrets, signing-key derivation, and payload signatures.
//!
//! Three kinds of key material exist and are kept apart by type:
//!
//! - [`SubscriptionSecret`]: the random value shown to the tenant once.
//!   Only its SHA-256 hash is stored.
//! - [`SigningKey`]: HMAC-SHA256(master key, subscription id), used to sign
//!   production deliveries. Never derived from the stored hash.
//! - [`TestKey`]: `test_<subscription id>`, sent in the clear with probe
//!   deliveries so receivers can tell probes from real traffic.
//!
//! Signatures use the header format `t=<unix seconds>,v1=<hex>` where the
//! MAC covers `"{timestamp}.{payload}"`.

use chrono::Utc;
use quire_core::{QuireError, SubscriptionId};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Default replay window for [`verify`], in seconds.
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
/// Header carrying the unix timestamp that was signed.
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
/// Header marking probe deliveries.
pub const TEST_HEADER: &str = "X-Webhook-Test";
/// Header carrying the probe's test key.
pub const TEST_KEY_HEADER: &str = "X-Webhook-Test-Key";

/// Minimum accepted master-key length, in bytes.
pub const MIN_MASTER_KEY_LEN: usize = 32;

const SECRET_BYTES: usize = 32;

/// Plaintext subscription secret. Returned to the caller exactly once.
pub struct SubscriptionSecret(Zeroizing<String>);

impl SubscriptionSecret {
    /// The 64-character hex secret.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// SHA-256 hex of the secret, the only form that is persisted.
    pub fn hash(&self) -> String {
        hash_secret(&self.0)
    }
}

impl std::fmt::Debug for SubscriptionSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SubscriptionSecret([redacted])")
    }
}

/// Generate a fresh subscription secret: 32 CSPRNG bytes, hex encoded.
pub fn generate_secret() -> Result<SubscriptionSecret, QuireError> {
    let rng = SystemRandom::new();
    let mut bytes = Zeroizing::new([0u8; SECRET_BYTES]);
    rng.fill(&mut bytes[..])
        .map_err(|_| QuireError::Internal("failed to generate subscription secret".to_string()))?;
    Ok(SubscriptionSecret(Zeroizing::new(hex::encode(&bytes[..]))))
}

/// SHA-256 hex digest of a secret.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Per-subscription key used to sign production deliveries.
#[derive(Clone)]
pub struct SigningKey(Zeroizing<String>);

impl SigningKey {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey([redacted])")
    }
}

/// Key used only by test probes: `test_<subscription id>`.
///
/// It is public by construction and never signs production traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestKey(String);

impl TestKey {
    pub fn for_subscription(id: &SubscriptionId) -> Self {
        Self(format!("test_{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Derives per-subscription signing keys from the server master key.
#[derive(Clone)]
pub struct KeyDeriver {
    master: hmac::Key,
}

impl KeyDeriver {
    /// Build a deriver from the configured master key.
    pub fn new(master_key: &SecretString) -> Result<Self, QuireError> {
        let raw = master_key.expose_secret();
        if raw.len() < MIN_MASTER_KEY_LEN {
            return Err(QuireError::Config(format!(
                "signing master key must be at least {MIN_MASTER_KEY_LEN} bytes"
            )));
        }
        Ok(Self {
            master: hmac::Key::new(hmac::HMAC_SHA256, raw.as_bytes()),
        })
    }

    /// HMAC-SHA256(master, subscription id), hex encoded.
    pub fn derive(&self, subscription_id: &SubscriptionId) -> SigningKey {
        let tag = hmac::sign(&self.master, subscription_id.as_str().as_bytes());
        SigningKey(Zeroizing::new(hex::encode(tag.as_ref())))
    }
}

impl std::fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyDeriver([redacted])")
    }
}

fn signed_message(payload: &str, timestamp: i64) -> String {
    format!("{timestamp}.{payload}")
}

/// Sign a payload, producing the `t=<ts>,v1=<hex>` header value.
pub fn sign(payload: &str, key: &[u8], timestamp: i64) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&key, signed_message(payload, timestamp).as_bytes());
    format!("t={timestamp},v1={}", hex::encode(tag.as_ref()))
}

/// Verify a signature header against the current clock.
///
/// Returns false on any problem: missing parts, stale timestamp, bad hex,
/// or a MAC mismatch.
pub fn verify(payload: &str, header: &str, key: &[u8], tolerance_secs: u64) -> bool {
    verify_at(payload, header, key, tolerance_secs, Utc::now().timestamp())
}

/// [`verify`] with an explicit `now`, in unix seconds.
pub fn verify_at(payload: &str, header: &str, key: &[u8], tolerance_secs: u64, now: i64) -> bool {
    let Some((timestamp, mac)) = parse_signature_header(header) else {
        return false;
    };
    if now.abs_diff(timestamp) > tolerance_secs {
        return false;
    }
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, signed_message(payload, timestamp).as_bytes(), &mac).is_ok()
}

/// Split `t=<ts>,v1=<hex>` into its timestamp and decoded MAC.
///
/// Parts may appear in any order; unknown parts are ignored.
pub fn parse_signature_header(header: &str) -> Option<(i64, Vec<u8>)> {
    let mut timestamp = None;
    let mut mac = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => mac = hex::decode(value).ok(),
            _ => {}
        }
    }
    Some((timestamp?, mac?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"whsec-test-key";

    fn master() -> SecretString {
        SecretString::from("0123456789abcdef0123456789abcdef-master".to_string())
    }

    #[test]
    fn generated_secret_is_64_hex_chars() {
        let secret = generate_secret().unwrap();
        assert_eq!(secret.expose().len(), 64);
        assert!(secret.expose().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret.expose(), generate_secret().unwrap().expose());
    }

    #[test]
    fn hash_is_sha256_hex_and_not_the_secret() {
        let secret = generate_secret().unwrap();
        let hash = secret.hash();
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, secret.expose());
        assert_eq!(hash, hash_secret(secret.expose()));
        assert_eq!(
            hash_secret("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = generate_secret().unwrap();
        assert!(!format!("{secret:?}").contains(secret.expose()));
    }

    #[test]
    fn derived_keys_are_stable_and_distinct() {
        let deriver = KeyDeriver::new(&master()).unwrap();
        let a1 = deriver.derive(&SubscriptionId::from("sub-a"));
        let a2 = deriver.derive(&SubscriptionId::from("sub-a"));
        let b = deriver.derive(&SubscriptionId::from("sub-b"));
        assert_eq!(a1.as_bytes(), a2.as_bytes());
        assert_ne!(a1.as_bytes(), b.as_bytes());
        assert_eq!(a1.as_bytes().len(), 64);
    }

    #[test]
    fn short_master_key_rejected() {
        let err = KeyDeriver::new(&SecretString::from("short".to_string())).unwrap_err();
        assert!(matches!(err, QuireError::Config(_)));
    }

    #[test]
    fn test_key_is_prefixed_subscription_id() {
        let key = TestKey::for_subscription(&SubscriptionId::from("sub-9"));
        assert_eq!(key.as_str(), "test_sub-9");
    }

    #[test]
    fn sign_produces_header_format() {
        let header = sign("{}", KEY, 1_700_000_000);
        assert!(header.starts_with("t=1700000000,v1="));
        let (ts, mac) = parse_signature_header(&header).unwrap();
        assert_eq!(ts, 1_700_000_000);
        assert_eq!(mac.len(), 32);
    }

    #[test]
    fn verify_accepts_fresh_signature() {
        let now = 1_700_000_000;
        let header = sign(r#"{"id":"e1"}"#, KEY, now - 10);
        assert!(verify_at(r#"{"id":"e1"}"#, &header, KEY, 300, now));
    }

    #[test]
    fn verify_rejects_stale_signature() {
        let now = 1_700_000_000;
        let header = sign("{}", KEY, now - 400);
        assert!(!verify_at("{}", &header, KEY, 300, now));
    }

    #[test]
    fn verify_rejects_tampering() {
        let now = 1_700_000_000;
        let header = sign("{\"a\":1}", KEY, now);
        assert!(!verify_at("{\"a\":2}", &header, KEY, 300, now));
        assert!(!verify_at("{\"a\":1}", &header, b"other-key", 300, now));
    }

    #[test]
    fn verify_rejects_malformed_headers() {
        let now = 1_700_000_000;
        for header in ["", "t=1700000000", "v1=abcd", "t=abc,v1=00", "t=1700000000,v1=zz"] {
            assert!(!verify_at("{}", header, KEY, 300, now), "{header}");
        }
    }

    #[test]
    fn verify_uses_wall_clock() {
        let header = sign("{}", KEY, Utc::now().timestamp());
        assert!(verify("{}", &header, KEY, SIGNATURE_TOLERANCE_SECS));
    }
}
