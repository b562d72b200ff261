//! Webhook signature verification
//!
//! # Architecture
//!
//! - Signatures are HMAC-SHA256 over the exact raw request body bytes.
//!   Parsing or re-serializing the body before verification changes the
//!   bytes and breaks the signature, so callers must pass the body as
//!   received on the wire.
//! - Comparison is constant-time (`Mac::verify_slice`).
//! - Each source declares a secret policy: fail-closed sources reject
//!   everything when no secret is configured; fail-open sources accept
//!   unsigned payloads only when no secret is configured (trusted-network
//!   sources with optional verification).
//!
//! # Pure Functions
//!
//! This module contains ONLY pure functions. No HTTP framework or database
//! dependencies - those live in the API service.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Behavior when no secret is configured for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretPolicy {
    /// Missing secret rejects all payloads
    FailClosed,
    /// Missing secret accepts payloads (trusted network, optional verification)
    FailOpen,
}

/// Known webhook sources
///
/// Adding a source here forces the match arms below to be extended, so
/// per-source policy and header names stay compile-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookSource {
    /// External automation partner - signatures are mandatory
    Partner,
    /// Internal scheduler/tooling on a trusted network - verification optional
    Internal,
}

impl WebhookSource {
    /// Parse a source from its URL path segment
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "partner" => Some(WebhookSource::Partner),
            "internal" => Some(WebhookSource::Internal),
            _ => None,
        }
    }

    /// URL path segment for this source
    pub fn as_slug(&self) -> &'static str {
        match self {
            WebhookSource::Partner => "partner",
            WebhookSource::Internal => "internal",
        }
    }

    /// Secret policy for this source
    pub fn secret_policy(&self) -> SecretPolicy {
        match self {
            WebhookSource::Partner => SecretPolicy::FailClosed,
            WebhookSource::Internal => SecretPolicy::FailOpen,
        }
    }

    /// HTTP header carrying the signature for this source
    pub fn signature_header(&self) -> &'static str {
        match self {
            WebhookSource::Partner => "x-webhook-signature",
            WebhookSource::Internal => "x-internal-signature",
        }
    }

    /// Settings key holding this source's secret (empty value = unset)
    pub fn secret_setting_key(&self) -> &'static str {
        match self {
            WebhookSource::Partner => "webhook_secret_partner",
            WebhookSource::Internal => "webhook_secret_internal",
        }
    }
}

/// Verification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Invalid,
}

/// Verify an HMAC-SHA256 hex signature over the raw body bytes
///
/// The signature is hex-encoded; comparison happens in constant time via
/// `Mac::verify_slice`. A signature that is not valid hex is Invalid.
pub fn verify_signature(raw_body: &[u8], signature_hex: &str, secret: &str) -> Verification {
    let provided = match hex::decode(signature_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return Verification::Invalid,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Verification::Invalid,
    };
    mac.update(raw_body);

    if mac.verify_slice(&provided).is_ok() {
        Verification::Valid
    } else {
        Verification::Invalid
    }
}

/// Compute the hex HMAC-SHA256 signature for a body (used by tests and
/// by internal callers that sign outbound notifications)
pub fn sign(raw_body: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

/// Apply the per-source secret policy and verify a payload
///
/// `secret` is the configured secret (None or empty = unset).
/// `signature_header` is the raw header value, if present.
pub fn verify_source(
    source: WebhookSource,
    secret: Option<&str>,
    raw_body: &[u8],
    signature_header: Option<&str>,
) -> Verification {
    let secret = secret.filter(|s| !s.is_empty());

    match (secret, source.secret_policy()) {
        // No secret configured: policy decides
        (None, SecretPolicy::FailClosed) => Verification::Invalid,
        (None, SecretPolicy::FailOpen) => Verification::Valid,

        // Secret configured: signature is always required and checked
        (Some(secret), _) => match signature_header {
            Some(sig) => verify_signature(raw_body, sig, secret),
            None => Verification::Invalid,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"event":"new_relation","account_id":"abc"}"#;
        let secret = "test-secret";
        let sig = sign(body, secret);

        assert_eq!(verify_signature(body, &sig, secret), Verification::Valid);
    }

    #[test]
    fn test_flipped_body_byte_rejected() {
        let body = br#"{"event":"new_relation"}"#.to_vec();
        let secret = "test-secret";
        let sig = sign(&body, secret);

        let mut tampered = body.clone();
        tampered[5] ^= 0x01;
        assert_eq!(
            verify_signature(&tampered, &sig, secret),
            Verification::Invalid
        );
    }

    #[test]
    fn test_flipped_signature_byte_rejected() {
        let body = br#"{"event":"new_relation"}"#;
        let secret = "test-secret";
        let sig = sign(body, secret);

        // Flip one hex character (0 <-> 1 guarantees a change)
        let mut chars: Vec<char> = sig.chars().collect();
        chars[0] = if chars[0] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();

        assert_eq!(
            verify_signature(body, &tampered, secret),
            Verification::Invalid
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = br#"{"event":"x"}"#;
        let sig = sign(body, "secret-a");
        assert_eq!(verify_signature(body, &sig, "secret-b"), Verification::Invalid);
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        let body = br#"{}"#;
        assert_eq!(
            verify_signature(body, "not-hex-at-all!", "secret"),
            Verification::Invalid
        );
    }

    #[test]
    fn test_fail_closed_source_without_secret_always_invalid() {
        let body = br#"{"event":"x"}"#;
        // Even a "correct-looking" signature cannot pass without a secret
        let sig = sign(body, "whatever");

        assert_eq!(
            verify_source(WebhookSource::Partner, None, body, Some(&sig)),
            Verification::Invalid
        );
        assert_eq!(
            verify_source(WebhookSource::Partner, Some(""), body, None),
            Verification::Invalid
        );
    }

    #[test]
    fn test_fail_open_source_without_secret_accepts() {
        let body = br#"{"event":"x"}"#;
        assert_eq!(
            verify_source(WebhookSource::Internal, None, body, None),
            Verification::Valid
        );
    }

    #[test]
    fn test_fail_open_source_with_secret_still_verifies() {
        let body = br#"{"event":"x"}"#;
        let sig = sign(body, "secret");

        assert_eq!(
            verify_source(WebhookSource::Internal, Some("secret"), body, Some(&sig)),
            Verification::Valid
        );
        // Once a secret is configured, unsigned payloads are rejected
        assert_eq!(
            verify_source(WebhookSource::Internal, Some("secret"), body, None),
            Verification::Invalid
        );
    }

    #[test]
    fn test_source_slug_round_trip() {
        for source in [WebhookSource::Partner, WebhookSource::Internal] {
            assert_eq!(WebhookSource::from_slug(source.as_slug()), Some(source));
        }
        assert_eq!(WebhookSource::from_slug("unknown"), None);
    }
}
