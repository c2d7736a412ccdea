// ABOUTME: Webhook signature verification with HMAC-SHA256 and replay protection
// ABOUTME: Constant-time comparisons throughout; failures are errors, never false
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Webhook Verification
//!
//! Validates inbound webhook authenticity before anything touches the
//! queue. Verification failures are always errors - a caller can never
//! mistake "unverified" for "verified with a falsy result".
//!
//! The replay window is enforced on `|now - timestamp|`, both directions:
//! stale replays and forged future timestamps are rejected even when the
//! signature itself is valid.
//!
//! Pure CPU-bound hashing with no shared mutable state; safe under
//! unlimited concurrency.

use crate::constants::webhooks::DEFAULT_REPLAY_WINDOW_SECS;
use crate::errors::{ConnectorError, ConnectorResult};
use chrono::Utc;
use ring::hmac;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

/// Signature schemes we know how to verify in composite headers
const RECOGNIZED_SCHEMES: &[&str] = &["v1"];

/// Verifies webhook signatures and rejects replays
pub struct WebhookVerifier {
    key: hmac::Key,
    replay_window_secs: i64,
}

impl WebhookVerifier {
    /// Create a verifier with the default 180 s replay window
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self::with_replay_window(secret, DEFAULT_REPLAY_WINDOW_SECS)
    }

    /// Create a verifier with an explicit replay window
    #[must_use]
    pub fn with_replay_window(secret: &str, replay_window_secs: i64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            replay_window_secs,
        }
    }

    /// Verify a timestamped HMAC-SHA256 signature
    ///
    /// The signed payload is `"{timestamp}.{body}"`, the signature its
    /// hex-encoded HMAC. The timestamp must fall inside the replay window
    /// regardless of signature validity.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Webhook`] for a malformed timestamp, a
    /// timestamp outside the replay window, or a signature mismatch
    pub fn verify_hmac_sha256(
        &self,
        timestamp: &str,
        body: &[u8],
        signature: &str,
    ) -> ConnectorResult<()> {
        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| ConnectorError::Webhook(format!("invalid timestamp: {timestamp}")))?;

        let now = Utc::now().timestamp();
        if (now - ts).abs() > self.replay_window_secs {
            return Err(ConnectorError::Webhook(format!(
                "timestamp outside replay window ({}s)",
                self.replay_window_secs
            )));
        }

        let mut payload = Vec::with_capacity(timestamp.len() + 1 + body.len());
        payload.extend_from_slice(timestamp.as_bytes());
        payload.push(b'.');
        payload.extend_from_slice(body);

        self.compare(&payload, signature, "HMAC signature mismatch")
    }

    /// Verify an HMAC-SHA256 over the raw body, no timestamp
    ///
    /// Used by vendors that sign the body alone and carry no replay
    /// protection in the signature itself.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Webhook`] on signature mismatch
    pub fn verify_sha256_hash(&self, body: &[u8], signature: &str) -> ConnectorResult<()> {
        self.compare(body, signature, "body hash mismatch")
    }

    /// Verify a composite `scheme=signature` header
    ///
    /// Vendors rotating signing schemes ship several versions at once, e.g.
    /// `v1=<hex>,v2=<hex>`. Each recognized scheme is tried in turn; the
    /// first valid one wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Webhook`] when the header contains no
    /// recognized scheme or none of the recognized signatures verify
    pub fn verify_signature_header(
        &self,
        timestamp: &str,
        body: &[u8],
        signature_header: &str,
    ) -> ConnectorResult<()> {
        let mut saw_recognized = false;

        for part in signature_header.split(',') {
            let Some((scheme, signature)) = part.split_once('=') else {
                continue;
            };
            let scheme = scheme.trim();
            if !RECOGNIZED_SCHEMES.contains(&scheme) {
                continue;
            }
            saw_recognized = true;
            if self
                .verify_hmac_sha256(timestamp, body, signature.trim())
                .is_ok()
            {
                return Ok(());
            }
        }

        if saw_recognized {
            Err(ConnectorError::Webhook(
                "no valid signature scheme matched".into(),
            ))
        } else {
            Err(ConnectorError::Webhook(
                "no recognized signature scheme in header".into(),
            ))
        }
    }

    fn compare(&self, payload: &[u8], signature: &str, mismatch: &str) -> ConnectorResult<()> {
        let tag = hmac::sign(&self.key, payload);
        let expected = hex::encode(tag.as_ref());

        if expected.as_bytes().ct_eq(signature.as_bytes()).into() {
            Ok(())
        } else {
            Err(ConnectorError::Webhook(mismatch.to_owned()))
        }
    }
}

/// Verify HTTP Basic Auth credentials in constant time
///
/// For vendors that authenticate webhooks with a shared username and
/// password instead of signatures. Both fields must match.
///
/// # Errors
///
/// Returns [`ConnectorError::Webhook`] when either credential differs
pub fn verify_basic_auth(
    username: &str,
    password: &str,
    expected_username: &str,
    expected_password: &str,
) -> ConnectorResult<()> {
    let user_ok: bool = username
        .as_bytes()
        .ct_eq(expected_username.as_bytes())
        .into();
    let pass_ok: bool = password
        .as_bytes()
        .ct_eq(expected_password.as_bytes())
        .into();

    if user_ok && pass_ok {
        Ok(())
    } else {
        Err(ConnectorError::Webhook(
            "basic auth credentials invalid".into(),
        ))
    }
}

/// Extract signature and timestamp values from webhook headers
///
/// Header names are resolved case-insensitively; vendors are inconsistent
/// about casing across their own documentation.
#[must_use]
pub fn extract_signature_headers(
    headers: &HashMap<String, String>,
    signature_name: &str,
    timestamp_name: &str,
) -> (Option<String>, Option<String>) {
    let lookup = |wanted: &str| {
        headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value.clone())
    };
    (lookup(signature_name), lookup(timestamp_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn sign(timestamp: &str, body: &[u8]) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA256, SECRET.as_bytes());
        let mut payload = timestamp.as_bytes().to_vec();
        payload.push(b'.');
        payload.extend_from_slice(body);
        hex::encode(hmac::sign(&key, &payload).as_ref())
    }

    #[test]
    fn valid_signature_inside_window_passes() {
        let verifier = WebhookVerifier::new(SECRET);
        let ts = Utc::now().timestamp().to_string();
        let body = br#"{"type":"recovery.updated"}"#;
        verifier
            .verify_hmac_sha256(&ts, body, &sign(&ts, body))
            .unwrap();
    }

    #[test]
    fn correct_signature_outside_window_is_rejected() {
        let verifier = WebhookVerifier::new(SECRET);
        let ts = (Utc::now().timestamp() - 600).to_string();
        let body = b"payload";
        let err = verifier
            .verify_hmac_sha256(&ts, body, &sign(&ts, body))
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Webhook(_)));
        assert!(err.to_string().contains("replay window"));
    }

    #[test]
    fn future_timestamps_are_rejected_too() {
        let verifier = WebhookVerifier::new(SECRET);
        let ts = (Utc::now().timestamp() + 600).to_string();
        let body = b"payload";
        assert!(verifier
            .verify_hmac_sha256(&ts, body, &sign(&ts, body))
            .is_err());
    }

    #[test]
    fn tampered_body_fails() {
        let verifier = WebhookVerifier::new(SECRET);
        let ts = Utc::now().timestamp().to_string();
        let signature = sign(&ts, b"original");
        assert!(verifier
            .verify_hmac_sha256(&ts, b"tampered", &signature)
            .is_err());
    }

    #[test]
    fn composite_header_accepts_first_valid_scheme() {
        let verifier = WebhookVerifier::new(SECRET);
        let ts = Utc::now().timestamp().to_string();
        let body = b"payload";
        let header = format!("v2=deadbeef,v1={}", sign(&ts, body));
        verifier
            .verify_signature_header(&ts, body, &header)
            .unwrap();
    }

    #[test]
    fn composite_header_without_recognized_scheme_fails() {
        let verifier = WebhookVerifier::new(SECRET);
        let ts = Utc::now().timestamp().to_string();
        let err = verifier
            .verify_signature_header(&ts, b"payload", "v9=deadbeef")
            .unwrap_err();
        assert!(err.to_string().contains("no recognized"));
    }

    #[test]
    fn body_hash_verification_ignores_timestamps() {
        let verifier = WebhookVerifier::new(SECRET);
        let key = hmac::Key::new(hmac::HMAC_SHA256, SECRET.as_bytes());
        let signature = hex::encode(hmac::sign(&key, b"body-only").as_ref());
        verifier.verify_sha256_hash(b"body-only", &signature).unwrap();
        assert!(verifier.verify_sha256_hash(b"other", &signature).is_err());
    }

    #[test]
    fn basic_auth_requires_both_fields() {
        verify_basic_auth("hook", "pw", "hook", "pw").unwrap();
        assert!(verify_basic_auth("hook", "wrong", "hook", "pw").is_err());
        assert!(verify_basic_auth("wrong", "pw", "hook", "pw").is_err());
    }

    #[test]
    fn header_extraction_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("x-whoop-signature".to_owned(), "sig".to_owned());
        headers.insert("X-WHOOP-Signature-Timestamp".to_owned(), "123".to_owned());
        let (signature, timestamp) = extract_signature_headers(
            &headers,
            "X-WHOOP-Signature",
            "x-whoop-signature-timestamp",
        );
        assert_eq!(signature.as_deref(), Some("sig"));
        assert_eq!(timestamp.as_deref(), Some("123"));
    }
}
