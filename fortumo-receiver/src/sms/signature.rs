//! Fortumo request signature verification.
//!
//! The provider signs every notification with
//! `md5(sorted key=value pairs without "sig" + secret)`, hex encoded.

use md5::{Digest, Md5};
use tracing::warn;

use super::request::{InboundRequest, SIGNATURE_KEY};

/// Build the canonical string for a request.
///
/// Every field except the signature is rendered as `key=value`, ordered by key
/// (byte-wise ascending) and concatenated without separators.
pub fn canonicalize(request: &InboundRequest) -> String {
    let mut pairs: Vec<(&str, &str)> = request
        .iter()
        .filter(|(k, _)| *k != SIGNATURE_KEY)
        .collect();
    pairs.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let mut canonical = String::new();
    for (k, v) in pairs {
        canonical.push_str(k);
        canonical.push('=');
        canonical.push_str(v);
    }
    canonical
}

/// MD5 of `canonical + secret` as 32 lowercase hex characters.
pub fn digest(canonical: &str, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(canonical.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check the `sig` field of a request against the shared secret.
///
/// The comparison ignores hex case and runs in constant time for equal-length
/// inputs.
pub fn verify(request: &InboundRequest, secret: &str) -> bool {
    let provided = match request.signature() {
        Some(sig) if !sig.is_empty() => sig,
        _ => {
            warn!("sms_signature_missing");
            return false;
        }
    };

    let expected = digest(&canonicalize(request), secret);
    let valid = constant_time_compare(&expected, &provided.to_ascii_lowercase());

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = provided.len(),
            "sms_signature_mismatch"
        );
    }

    valid
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

    fn request(pairs: &[(&str, &str)]) -> InboundRequest {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_canonicalize_sorts_and_skips_signature() {
        let sms = request(&[("service_id", "S"), ("foo", "1"), ("sig", "abc"), ("bar", "2")]);
        assert_eq!(canonicalize(&sms), "bar=2foo=1service_id=S");
    }

    #[test]
    fn test_canonicalize_is_order_independent() {
        let a = request(&[("keyword", "TEST"), ("message", "hi"), ("sender", "372")]);
        let b = request(&[("sender", "372"), ("keyword", "TEST"), ("message", "hi")]);
        let c = request(&[("message", "hi"), ("sender", "372"), ("keyword", "TEST")]);

        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(canonicalize(&b), canonicalize(&c));
    }

    #[test]
    fn test_canonicalize_orders_by_key_bytes() {
        // 'B' (0x42) sorts before 'a' (0x61); "a" sorts before "a-b" although
        // "a-b=" sorts before "a=" as whole pairs.
        let sms = request(&[("a-b", "2"), ("a", "1"), ("B", "3")]);
        assert_eq!(canonicalize(&sms), "B=3a=1a-b=2");
    }

    #[test]
    fn test_canonicalize_empty() {
        assert_eq!(canonicalize(&InboundRequest::default()), "");
        assert_eq!(canonicalize(&request(&[("sig", "x")])), "");
    }

    #[test]
    fn test_digest_known_values() {
        assert_eq!(digest("bar=2foo=1", "X"), "7a66d1c8296b16a0f1fe52770f425019");
        assert_eq!(
            digest("bar=2foo=1service_id=S", "X"),
            "e3777b42e5037f2583f2cd54da6b632a"
        );
    }

    #[test]
    fn test_digest_is_lowercase_hex() {
        let d = digest("anything", "secret");
        assert_eq!(d.len(), 32);
        assert!(d.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_verify_provider_example() {
        let secret = "c0ed6ef48be0460c8ab90c4ebd23f7e7";
        let sms = request(&[
            ("message", "hello"),
            ("sender", "3725555555"),
            ("service_id", "34f7e5747de26810f1de920c1b8f9e4f"),
            ("keyword", "TEST"),
            ("sig", "a260ed40442ef07e730a8f5bc7a46a99"),
        ]);

        assert!(verify(&sms, secret));
    }

    #[test]
    fn test_verify_accepts_uppercase_hex() {
        let sms = request(&[
            ("bar", "2"),
            ("foo", "1"),
            ("service_id", "S"),
            ("sig", "E3777B42E5037F2583F2CD54DA6B632A"),
        ]);
        assert!(verify(&sms, "X"));
    }

    #[test]
    fn test_verify_rejects_tampered_field() {
        let sms = request(&[
            ("bar", "2"),
            ("foo", "2"),
            ("service_id", "S"),
            ("sig", "e3777b42e5037f2583f2cd54da6b632a"),
        ]);
        assert!(!verify(&sms, "X"));
    }

    #[test]
    fn test_verify_rejects_wrong_secret_and_missing_sig() {
        let signed = request(&[
            ("bar", "2"),
            ("foo", "1"),
            ("service_id", "S"),
            ("sig", "e3777b42e5037f2583f2cd54da6b632a"),
        ]);
        assert!(!verify(&signed, "Y"));

        let unsigned = request(&[("bar", "2"), ("foo", "1"), ("service_id", "S")]);
        assert!(!verify(&unsigned, "X"));
    }

    #[test]
    fn test_corrupting_any_field_changes_digest() {
        let base = [("bar", "2"), ("foo", "1"), ("service_id", "S")];
        let original = digest(&canonicalize(&request(&base)), "X");

        for i in 0..base.len() {
            let mut corrupted = base;
            corrupted[i].1 = "tampered";
            assert_ne!(digest(&canonicalize(&request(&corrupted)), "X"), original);
        }
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
