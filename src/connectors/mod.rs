// ABOUTME: Per-vendor connector composing vault, OAuth, rate limiting, webhooks, and jobs
// ABOUTME: Vendor specifics live behind the VendorHooks capability trait, one impl per vendor
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Connectors
//!
//! One [`Connector`] per vendor wires the shared subsystems together:
//! encrypted token vault, OAuth client, rate limiter, webhook verifier, and
//! job queue. The only vendor-specific behavior - how webhooks are verified
//! and parsed - lives behind [`VendorHooks`], with one concrete
//! implementation per vendor selected by [`hooks_for`].
//!
//! The rate limiter and vault are injected shared state, constructed once
//! per process and handed to every connector.

mod fitbit;
mod garmin;
mod whoop;

pub use fitbit::FitbitHooks;
pub use garmin::GarminHooks;
pub use whoop::WhoopHooks;

use crate::errors::{ConnectorError, ConnectorResult};
use crate::jobs::JobQueue;
use crate::models::{OAuthTokenSet, Vendor, VendorConfig, WebhookEvent};
use crate::oauth::{HttpPort, OAuthClient};
use crate::rate_limiting::{RateLimitStatus, RateLimiter};
use crate::tokens::TokenVault;
use crate::webhooks::WebhookVerifier;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A webhook payload reduced to the fields the queue message needs
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub event_type: String,
    pub user_id: String,
    pub resource_id: Option<String>,
    /// Vendor-supplied correlation ID; absent means one is generated
    pub trace_id: Option<String>,
    pub payload: serde_json::Value,
}

/// Vendor-specific webhook behavior
///
/// Everything else about a connector is shared; implementations of this
/// trait encode how one vendor signs its webhooks and shapes its payloads.
pub trait VendorHooks: Send + Sync {
    /// The vendor this hook set belongs to
    fn vendor(&self) -> Vendor;

    /// Authenticate an inbound webhook before its body is trusted
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Webhook`] when authentication fails or the
    /// required headers are missing
    fn verify_webhook(
        &self,
        verifier: Option<&WebhookVerifier>,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> ConnectorResult<()>;

    /// Extract the event fields from a verified webhook body
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Webhook`] for malformed payloads
    fn parse_event(&self, body: &[u8]) -> ConnectorResult<ParsedEvent>;
}

/// Select the hook implementation for a vendor
#[must_use]
pub fn hooks_for(config: &VendorConfig) -> Box<dyn VendorHooks> {
    match config.vendor {
        Vendor::Whoop => Box::new(WhoopHooks),
        Vendor::Fitbit => Box::new(FitbitHooks),
        Vendor::Garmin => Box::new(GarminHooks::new(config.webhook_secret.as_deref())),
    }
}

/// One vendor's connector, composed from the shared subsystems
pub struct Connector {
    config: VendorConfig,
    hooks: Box<dyn VendorHooks>,
    vault: Arc<TokenVault>,
    oauth: OAuthClient,
    limiter: Arc<RateLimiter>,
    verifier: Option<WebhookVerifier>,
    jobs: Arc<JobQueue>,
}

impl Connector {
    /// Wire a connector from its configuration and the shared subsystems
    ///
    /// Registers the vendor's rate limit with the injected limiter when the
    /// configuration carries one.
    pub fn new(
        config: VendorConfig,
        vault: Arc<TokenVault>,
        limiter: Arc<RateLimiter>,
        jobs: Arc<JobQueue>,
        http: Arc<dyn HttpPort>,
    ) -> Self {
        if let Some(rate_limit) = config.rate_limit {
            limiter.configure(config.vendor, rate_limit);
        }

        let oauth = OAuthClient::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.auth_url.clone(),
            config.token_url.clone(),
            config.revoke_url.clone(),
            http,
        );
        let verifier = config
            .webhook_secret
            .as_deref()
            .map(WebhookVerifier::new);
        let hooks = hooks_for(&config);

        Self {
            config,
            hooks,
            vault,
            oauth,
            limiter,
            verifier,
            jobs,
        }
    }

    /// The vendor this connector serves
    #[must_use]
    pub fn vendor(&self) -> Vendor {
        self.config.vendor
    }

    /// Build the consent-redirect URL for the configured vendor
    #[must_use]
    pub fn authorization_url(&self, state: Option<&str>) -> String {
        self.oauth.authorization_url(
            &self.config.redirect_uri,
            &self.config.scopes,
            state,
            &[],
        )
    }

    /// Exchange an authorization code and persist the resulting tokens
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::OAuth`] when the vendor rejects the grant,
    /// [`ConnectorError::VendorApi`] on transport failure, or
    /// [`ConnectorError::Token`] if the tokens cannot be persisted
    pub async fn exchange(
        &self,
        code: &str,
        user_id: &str,
        vendor_meta: HashMap<String, String>,
    ) -> ConnectorResult<OAuthTokenSet> {
        let tokens = self.oauth.exchange(code, &self.config.redirect_uri).await?;
        self.vault
            .save(self.vendor(), user_id, &tokens, vendor_meta)
            .await?;
        info!(vendor = %self.vendor(), user_id, "Connected user via code exchange");
        Ok(tokens)
    }

    /// Return valid tokens for a user, refreshing once if expired
    ///
    /// Valid stored tokens return with zero network calls. Expired tokens
    /// with a refresh token trigger exactly one refresh grant, whose result
    /// is persisted before being returned. Expired tokens without a refresh
    /// token, and users with no tokens at all, fail without retry.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::OAuth`] when no usable tokens exist or the
    /// refresh grant is rejected, [`ConnectorError::VendorApi`] on transport
    /// failure, or [`ConnectorError::Token`] on storage failure
    pub async fn refresh_if_needed(&self, user_id: &str) -> ConnectorResult<OAuthTokenSet> {
        let vendor = self.vendor();
        let Some(tokens) = self.vault.get(vendor, user_id).await? else {
            return Err(ConnectorError::OAuth(format!(
                "no tokens found for {vendor}:{user_id}"
            )));
        };

        if !tokens.is_expired() {
            return Ok(tokens);
        }

        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            return Err(ConnectorError::OAuth(
                "access token expired and no refresh token available".into(),
            ));
        };

        let refreshed = self.oauth.refresh(refresh_token).await?;
        self.vault
            .save(vendor, user_id, &refreshed, HashMap::new())
            .await?;
        info!(vendor = %vendor, user_id, "Refreshed expired access token");
        Ok(refreshed)
    }

    /// Disconnect a user: best-effort vendor revocation, then local revoke
    ///
    /// The vendor-side call is advisory; a transport failure or vendor
    /// rejection is logged and the local revocation proceeds regardless.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::TokenNotFound`] when the user has no stored
    /// tokens, or [`ConnectorError::Token`] on storage failure
    pub async fn revoke(&self, user_id: &str) -> ConnectorResult<()> {
        let vendor = self.vendor();
        if let Some(tokens) = self.vault.get(vendor, user_id).await? {
            match self.oauth.revoke(&tokens.access_token).await {
                Ok(true) => {}
                Ok(false) => warn!(vendor = %vendor, user_id, "Vendor declined token revocation"),
                Err(err) => {
                    warn!(vendor = %vendor, user_id, error = %err, "Vendor revocation unreachable");
                }
            }
        }
        self.vault.revoke(vendor, user_id).await
    }

    /// Verify, parse, and enqueue an inbound webhook; returns the message ID
    ///
    /// The trace ID comes from the payload when the vendor supplies one, so
    /// vendor-side redeliveries dedup to a single queued job; otherwise a
    /// fresh UUID is generated.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Webhook`] when verification or parsing
    /// fails, or [`ConnectorError::Enqueue`] when the queue rejects the job
    pub async fn process_webhook(
        &self,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> ConnectorResult<String> {
        self.hooks
            .verify_webhook(self.verifier.as_ref(), headers, body)?;
        let parsed = self.hooks.parse_event(body)?;

        let event = WebhookEvent {
            vendor: self.vendor(),
            event_type: parsed.event_type,
            user_id: parsed.user_id,
            resource_id: parsed.resource_id,
            trace_id: parsed
                .trace_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            received_at: Utc::now(),
            payload: parsed.payload,
        };

        let message_id = self.jobs.enqueue(event, 0).await?;
        Ok(message_id)
    }

    /// Enqueue a historical backfill job covering a date range
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Enqueue`] on queue failure
    pub async fn request_backfill(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConnectorResult<String> {
        self.jobs
            .enqueue_backfill(self.vendor(), user_id, start, end)
            .await
    }

    /// Admit or reject an outbound API call against the rate limits
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::RateLimit`] with a retry hint when capacity
    /// is exhausted
    pub fn check_rate_limit(&self, user_id: Option<&str>, cost: f64) -> ConnectorResult<()> {
        self.limiter.check(self.vendor(), user_id, cost)
    }

    /// Remaining rate limit capacity for this vendor and optionally one user
    #[must_use]
    pub fn rate_limit_status(&self, user_id: Option<&str>) -> RateLimitStatus {
        self.limiter.remaining(self.vendor(), user_id)
    }
}
