// ABOUTME: Integration tests for webhook verification and replay protection
// ABOUTME: Covers HMAC validity, the 180 s replay window, and composite headers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

mod common;

use chrono::Utc;
use common::init_test_logging;
use ring::hmac;
use wearsync_connector::errors::ConnectorError;
use wearsync_connector::webhooks::WebhookVerifier;

const SECRET: &str = "whsec_integration";

fn sign(timestamp: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, SECRET.as_bytes());
    let mut payload = timestamp.as_bytes().to_vec();
    payload.push(b'.');
    payload.extend_from_slice(body);
    hex::encode(hmac::sign(&key, &payload).as_ref())
}

#[test]
fn fresh_signature_verifies() {
    init_test_logging();
    let verifier = WebhookVerifier::new(SECRET);
    let ts = Utc::now().timestamp().to_string();
    let body = br#"{"type":"workout.updated","user_id":77}"#;
    verifier
        .verify_hmac_sha256(&ts, body, &sign(&ts, body))
        .unwrap();
}

#[test]
fn ten_minute_old_signature_is_rejected_despite_being_valid() {
    init_test_logging();
    let verifier = WebhookVerifier::new(SECRET);
    let ts = (Utc::now().timestamp() - 600).to_string();
    let body = b"replayed";

    let err = verifier
        .verify_hmac_sha256(&ts, body, &sign(&ts, body))
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Webhook(_)));
    assert!(!err.is_retryable());
}

#[test]
fn widened_replay_window_admits_older_deliveries() {
    init_test_logging();
    let verifier = WebhookVerifier::with_replay_window(SECRET, 900);
    let ts = (Utc::now().timestamp() - 600).to_string();
    let body = b"delayed but legitimate";
    verifier
        .verify_hmac_sha256(&ts, body, &sign(&ts, body))
        .unwrap();
}

#[test]
fn wrong_secret_never_verifies() {
    init_test_logging();
    let verifier = WebhookVerifier::new("different-secret");
    let ts = Utc::now().timestamp().to_string();
    let body = b"payload";
    assert!(verifier
        .verify_hmac_sha256(&ts, body, &sign(&ts, body))
        .is_err());
}

#[test]
fn garbage_timestamp_is_rejected_before_any_crypto() {
    init_test_logging();
    let verifier = WebhookVerifier::new(SECRET);
    assert!(verifier
        .verify_hmac_sha256("not-a-number", b"body", "deadbeef")
        .is_err());
}

#[test]
fn composite_header_with_rotated_schemes_verifies() {
    init_test_logging();
    let verifier = WebhookVerifier::new(SECRET);
    let ts = Utc::now().timestamp().to_string();
    let body = b"payload";

    // Valid v1 next to an unrecognized future scheme
    let header = format!("v1={},v3=00ff", sign(&ts, body));
    verifier
        .verify_signature_header(&ts, body, &header)
        .unwrap();

    // Recognized scheme with a bad signature still fails
    let err = verifier
        .verify_signature_header(&ts, body, "v1=deadbeef")
        .unwrap_err();
    assert!(err.to_string().contains("no valid signature"));
}
