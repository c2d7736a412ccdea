// ABOUTME: Common data models for vendor connections, tokens, webhooks, and queue messages
// ABOUTME: Value objects shared by the vault, OAuth client, verifier, and job queue
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Shared data models.
//!
//! These types are value objects: created whole, never mutated in place
//! (the single exception is [`QueueMessage::retries`], incremented on
//! requeue). Serialization shapes here are wire contracts consumed by the
//! downstream processing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Wearable vendors supported by the connector core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Whoop,
    Garmin,
    Fitbit,
}

impl Vendor {
    /// Stable lowercase identifier used in storage keys and queue groups
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Whoop => "whoop",
            Self::Garmin => "garmin",
            Self::Fitbit => "fitbit",
        }
    }

    /// All supported vendors
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Whoop, Self::Garmin, Self::Fitbit]
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "whoop" => Ok(Self::Whoop),
            "garmin" => Ok(Self::Garmin),
            "fitbit" => Ok(Self::Fitbit),
            other => Err(format!("unknown vendor: {other}")),
        }
    }
}

/// Lifecycle status of a stored token record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    /// Current, readable record
    Active,
    /// Access token lifetime elapsed without refresh
    Expired,
    /// User disconnected; terminal state
    Revoked,
    /// Exchange in flight, not yet usable
    Pending,
}

impl TokenStatus {
    /// Stable lowercase identifier persisted in token records
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Pending => "pending",
        }
    }
}

/// OAuth token set returned by exchange and refresh
///
/// Immutable value object; a refresh produces a wholly new set rather than
/// mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry computed at response receipt as `now + expires_in`
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    /// Vendor-defined scope order is preserved
    pub scopes: Vec<String>,
}

impl OAuthTokenSet {
    /// Whether the access token lifetime has elapsed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Persisted, encrypted form of a token set
///
/// Records are append-only: each save writes a new version keyed by its
/// creation timestamp. The only permitted in-place mutation is flipping
/// `status` to `revoked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Partition key, `<vendor>:<user_id>`
    pub pk: String,
    /// Sort key, RFC 3339 creation timestamp (append-only versioning)
    pub sk: String,
    /// Encrypted access token, base64
    pub access_token: String,
    /// Encrypted refresh token, base64, when the vendor issued one
    pub refresh_token: Option<String>,
    /// Absolute epoch expiry of the access token
    pub expires_at: i64,
    pub token_type: String,
    pub scopes: Vec<String>,
    pub status: TokenStatus,
    /// Vendor-specific metadata captured at exchange time
    #[serde(default)]
    pub vendor_meta: HashMap<String, String>,
}

impl TokenRecord {
    /// Build the partition key for a (vendor, user) pair
    #[must_use]
    pub fn partition_key(vendor: Vendor, user_id: &str) -> String {
        format!("{vendor}:{user_id}")
    }
}

/// Token record metadata exposed by scans, without decrypted secrets
#[derive(Debug, Clone, Serialize)]
pub struct TokenMetadata {
    pub vendor: String,
    pub user_id: String,
    pub status: TokenStatus,
    pub expires_at: i64,
    pub scopes: Vec<String>,
    pub created_at: String,
}

/// Rate limit configuration for a vendor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length in seconds
    pub time_window_secs: u32,
    /// Optional burst ceiling; defaults to `max_requests`
    pub max_burst: Option<u32>,
}

/// Verified inbound webhook event
///
/// Created once per verified webhook and consumed exactly once by
/// [`crate::jobs::JobQueue::enqueue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub vendor: Vendor,
    pub event_type: String,
    pub user_id: String,
    pub resource_id: Option<String>,
    /// Correlation ID, also the queue dedup key
    pub trace_id: String,
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Queue message wrapping a webhook event with its retry counter
///
/// `retries` is the one mutable field in the data model; requeue increments
/// it up to the configured maximum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub vendor: Vendor,
    pub event_type: String,
    pub user_id: String,
    pub resource_id: Option<String>,
    pub trace_id: String,
    pub received_at: DateTime<Utc>,
    pub retries: u32,
    pub payload: serde_json::Value,
}

impl QueueMessage {
    /// Wrap a fresh webhook event with a zeroed retry counter
    #[must_use]
    pub fn from_event(event: WebhookEvent) -> Self {
        Self {
            vendor: event.vendor,
            event_type: event.event_type,
            user_id: event.user_id,
            resource_id: event.resource_id,
            trace_id: event.trace_id,
            received_at: event.received_at,
            retries: 0,
            payload: event.payload,
        }
    }

    /// Ordering group: messages for one user process in submission order
    #[must_use]
    pub fn group_id(&self) -> String {
        format!("{}:{}", self.vendor, self.user_id)
    }
}

/// Immutable vendor configuration supplied at connector construction
#[derive(Debug, Clone)]
pub struct VendorConfig {
    pub vendor: Vendor,
    pub client_id: String,
    pub client_secret: String,
    /// Authorization endpoint for the consent redirect
    pub auth_url: String,
    /// Token endpoint for exchange and refresh grants
    pub token_url: String,
    /// Revocation endpoint; vendors without one revoke trivially
    pub revoke_url: Option<String>,
    pub redirect_uri: String,
    /// Secret for webhook signature verification, when the vendor signs
    pub webhook_secret: Option<String>,
    pub scopes: Vec<String>,
    pub rate_limit: Option<RateLimitConfig>,
}

/// Incremental sync cursor for one (vendor, user) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    pub vendor: Vendor,
    pub user_id: String,
    /// Last successful sync timestamp, RFC 3339 UTC
    pub last_sync_ts: String,
    /// Total records synced across all pulls
    pub records_synced: u64,
    /// Last resource ID seen, for pagination resume
    pub last_resource_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
