// ABOUTME: End-to-end tests for the per-vendor connector composition
// ABOUTME: Covers refresh_if_needed states, revoke, and webhook-to-queue flow
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

mod common;

use chrono::Utc;
use common::{
    create_test_queue, create_test_vault, token_set, vendor_config, ScriptedHttp,
};
use ring::hmac;
use std::collections::HashMap;
use std::sync::Arc;
use wearsync_connector::connectors::Connector;
use wearsync_connector::errors::ConnectorError;
use wearsync_connector::jobs::MemoryQueue;
use wearsync_connector::models::{Vendor, VendorConfig};
use wearsync_connector::rate_limiting::RateLimiter;
use wearsync_connector::tokens::{MemoryTokenStore, TokenStore, TokenVault};

struct Harness {
    connector: Connector,
    vault: Arc<TokenVault>,
    store: Arc<MemoryTokenStore>,
    backend: Arc<MemoryQueue>,
    http: Arc<ScriptedHttp>,
}

fn harness(config: VendorConfig, responses: Vec<(u16, &str)>) -> Harness {
    let (vault, store) = create_test_vault();
    let (jobs, backend) = create_test_queue();
    let http = ScriptedHttp::new(responses);
    let limiter = Arc::new(RateLimiter::new());
    let connector = Connector::new(config, vault.clone(), limiter, jobs, http.clone());
    Harness {
        connector,
        vault,
        store,
        backend,
        http,
    }
}

#[tokio::test]
async fn valid_tokens_return_without_network_calls() {
    let h = harness(vendor_config(Vendor::Whoop, None), vec![]);
    h.vault
        .save(Vendor::Whoop, "u1", &token_set(3600, Some("rt")), HashMap::new())
        .await
        .unwrap();

    let tokens = h.connector.refresh_if_needed("u1").await.unwrap();
    assert_eq!(tokens.access_token, "access-token");
    assert_eq!(h.http.call_count(), 0);
}

#[tokio::test]
async fn expired_tokens_refresh_exactly_once_and_persist() {
    let grant = ScriptedHttp::grant_body("refreshed-at", 3600);
    let h = harness(vendor_config(Vendor::Whoop, None), vec![(200, &grant)]);
    h.vault
        .save(Vendor::Whoop, "u1", &token_set(-60, Some("rt")), HashMap::new())
        .await
        .unwrap();

    let tokens = h.connector.refresh_if_needed("u1").await.unwrap();
    assert_eq!(tokens.access_token, "refreshed-at");
    assert_eq!(h.http.call_count(), 1);

    // The refreshed set was written as a new record version
    assert_eq!(h.store.version_count("whoop:u1").await, 2);
    let stored = h.vault.get(Vendor::Whoop, "u1").await.unwrap().unwrap();
    assert_eq!(stored.access_token, "refreshed-at");
}

#[tokio::test]
async fn expired_tokens_without_refresh_fail_without_retry() {
    let h = harness(vendor_config(Vendor::Whoop, None), vec![]);
    h.vault
        .save(Vendor::Whoop, "u1", &token_set(-60, None), HashMap::new())
        .await
        .unwrap();

    let err = h.connector.refresh_if_needed("u1").await.unwrap_err();
    assert!(matches!(err, ConnectorError::OAuth(_)));
    assert_eq!(h.http.call_count(), 0);
}

#[tokio::test]
async fn unknown_user_is_an_oauth_error() {
    let h = harness(vendor_config(Vendor::Whoop, None), vec![]);
    let err = h.connector.refresh_if_needed("ghost").await.unwrap_err();
    assert!(matches!(err, ConnectorError::OAuth(_)));
}

#[tokio::test]
async fn exchange_persists_tokens_with_vendor_meta() {
    let grant = ScriptedHttp::grant_body("fresh-at", 3600);
    let h = harness(vendor_config(Vendor::Fitbit, None), vec![(200, &grant)]);

    let meta = HashMap::from([("member_since".to_owned(), "2023".to_owned())]);
    let tokens = h.connector.exchange("auth-code", "u9", meta).await.unwrap();
    assert_eq!(tokens.access_token, "fresh-at");

    let record = h
        .store
        .get_latest("fitbit:u9")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record.vendor_meta.get("member_since").map(String::as_str),
        Some("2023")
    );
}

#[tokio::test]
async fn revoke_invalidates_locally_even_when_vendor_is_down() {
    // Transport failure on the vendor revoke call
    let h = harness(vendor_config(Vendor::Whoop, None), vec![]);
    h.vault
        .save(Vendor::Whoop, "u1", &token_set(3600, None), HashMap::new())
        .await
        .unwrap();

    h.connector.revoke("u1").await.unwrap();
    assert!(h.vault.get(Vendor::Whoop, "u1").await.unwrap().is_none());
}

#[tokio::test]
async fn process_webhook_verifies_parses_and_enqueues() {
    let secret = "whoop-secret";
    let h = harness(vendor_config(Vendor::Whoop, Some(secret)), vec![]);

    let body = br#"{"id":"rec-1","user_id":10129,"type":"recovery.updated","trace_id":"t-42"}"#;
    let ts = Utc::now().timestamp().to_string();
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let mut payload = ts.as_bytes().to_vec();
    payload.push(b'.');
    payload.extend_from_slice(body);
    let signature = hex::encode(hmac::sign(&key, &payload).as_ref());

    let headers = HashMap::from([
        ("X-WHOOP-Signature".to_owned(), signature),
        ("X-WHOOP-Signature-Timestamp".to_owned(), ts),
    ]);

    let first = h.connector.process_webhook(&headers, body).await.unwrap();
    // Vendor-side redelivery dedups on the payload trace id
    let second = h.connector.process_webhook(&headers, body).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.backend.len(), 1);
}

#[tokio::test]
async fn unsigned_webhook_never_reaches_the_queue() {
    let h = harness(vendor_config(Vendor::Whoop, Some("whoop-secret")), vec![]);

    let err = h
        .connector
        .process_webhook(&HashMap::new(), b"{}")
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Webhook(_)));
    assert!(h.backend.is_empty());
}

#[tokio::test]
async fn connector_registers_its_rate_limit_on_construction() {
    let h = harness(vendor_config(Vendor::Whoop, None), vec![]);

    for _ in 0..100 {
        h.connector.check_rate_limit(Some("u1"), 1.0).unwrap();
    }
    let err = h.connector.check_rate_limit(Some("u1"), 1.0).unwrap_err();
    assert!(matches!(err, ConnectorError::RateLimit { .. }));

    let status = h.connector.rate_limit_status(Some("u1"));
    assert_eq!(status.vendor.unwrap().remaining, 0);
}

#[tokio::test]
async fn backfill_request_lands_on_the_queue() {
    let h = harness(vendor_config(Vendor::Garmin, None), vec![]);
    let start = Utc::now() - chrono::Duration::days(7);
    let end = Utc::now();

    h.connector.request_backfill("u1", start, end).await.unwrap();
    assert_eq!(h.backend.len(), 1);
}
