// ABOUTME: Shared test utilities and setup helpers for integration tests
// ABOUTME: Provides vault, connector, and scripted HTTP transport builders
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(dead_code, clippy::missing_panics_doc, clippy::must_use_candidate)]

//! Shared test utilities for `wearsync_connector`

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use wearsync_connector::crypto::MasterEncryptionKey;
use wearsync_connector::errors::{ConnectorError, ConnectorResult};
use wearsync_connector::jobs::{JobQueue, MemoryQueue};
use wearsync_connector::models::{OAuthTokenSet, RateLimitConfig, Vendor, VendorConfig};
use wearsync_connector::oauth::HttpPort;
use wearsync_connector::tokens::{MemoryTokenStore, TokenVault};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Vault over an in-memory store with a fixed test key
pub fn create_test_vault() -> (Arc<TokenVault>, Arc<MemoryTokenStore>) {
    init_test_logging();
    let store = Arc::new(MemoryTokenStore::new());
    let cipher = Arc::new(MasterEncryptionKey::from_bytes([42u8; 32]));
    let vault = Arc::new(TokenVault::new(store.clone(), cipher));
    (vault, store)
}

/// Job queue over an in-memory backend
pub fn create_test_queue() -> (Arc<JobQueue>, Arc<MemoryQueue>) {
    init_test_logging();
    let backend = Arc::new(MemoryQueue::new());
    let queue = Arc::new(JobQueue::new(backend.clone()));
    (queue, backend)
}

/// Token set expiring `expires_in_secs` from now (negative = already expired)
pub fn token_set(expires_in_secs: i64, refresh_token: Option<&str>) -> OAuthTokenSet {
    OAuthTokenSet {
        access_token: "access-token".into(),
        refresh_token: refresh_token.map(str::to_owned),
        expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        token_type: "Bearer".into(),
        scopes: vec!["read:recovery".into()],
    }
}

/// Minimal vendor configuration pointing at example endpoints
pub fn vendor_config(vendor: Vendor, webhook_secret: Option<&str>) -> VendorConfig {
    VendorConfig {
        vendor,
        client_id: "test-client".into(),
        client_secret: "test-secret".into(),
        auth_url: "https://vendor.example/oauth/authorize".into(),
        token_url: "https://vendor.example/oauth/token".into(),
        revoke_url: Some("https://vendor.example/oauth/revoke".into()),
        redirect_uri: "https://app.example/callback".into(),
        webhook_secret: webhook_secret.map(str::to_owned),
        scopes: vec!["read:recovery".into(), "read:sleep".into()],
        rate_limit: Some(RateLimitConfig {
            max_requests: 100,
            time_window_secs: 60,
            max_burst: None,
        }),
    }
}

/// Scripted HTTP transport: pops one canned (status, body) per call
pub struct ScriptedHttp {
    responses: Mutex<VecDeque<(u16, String)>>,
    calls: AtomicUsize,
}

impl ScriptedHttp {
    pub fn new(responses: Vec<(u16, &str)>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| (status, body.to_owned()))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        })
    }

    /// Total network calls observed
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Canned token grant body with the given access token and lifetime
    pub fn grant_body(access_token: &str, expires_in: i64) -> String {
        format!(
            r#"{{"access_token":"{access_token}","refresh_token":"new-refresh","expires_in":{expires_in},"token_type":"Bearer","scope":"read:recovery"}}"#
        )
    }
}

#[async_trait]
impl HttpPort for ScriptedHttp {
    async fn post_form(
        &self,
        _url: &str,
        _params: &[(&str, &str)],
        _headers: &[(&str, &str)],
    ) -> ConnectorResult<(u16, String)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ConnectorError::VendorApi {
                message: "no scripted response remaining".into(),
                status: None,
            })
    }
}
