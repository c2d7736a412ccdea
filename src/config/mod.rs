// ABOUTME: Environment-driven configuration for vendor credentials and endpoints
// ABOUTME: Per-vendor env var loading with sensible defaults for endpoints and limits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Configuration
//!
//! Loads per-vendor OAuth credentials, endpoint URLs, webhook secrets, and
//! rate limits from environment variables. Credentials are required; every
//! other value falls back to the vendor's published defaults. Env vars are
//! prefixed with the uppercased vendor name, e.g. `WHOOP_CLIENT_ID`.

use crate::errors::{ConnectorError, ConnectorResult};
use crate::models::{RateLimitConfig, Vendor, VendorConfig};
use std::env;

/// Published OAuth endpoints and default scopes for one vendor
struct VendorDefaults {
    auth_url: &'static str,
    token_url: &'static str,
    revoke_url: Option<&'static str>,
    scopes: &'static [&'static str],
    rate_limit: RateLimitConfig,
}

fn defaults(vendor: Vendor) -> VendorDefaults {
    match vendor {
        Vendor::Whoop => VendorDefaults {
            auth_url: "https://api.prod.whoop.com/oauth/oauth2/auth",
            token_url: "https://api.prod.whoop.com/oauth/oauth2/token",
            revoke_url: Some("https://api.prod.whoop.com/oauth/oauth2/revoke"),
            scopes: &[
                "read:recovery",
                "read:sleep",
                "read:workout",
                "read:cycles",
                "read:profile",
            ],
            rate_limit: RateLimitConfig {
                max_requests: 100,
                time_window_secs: 60,
                max_burst: Some(120),
            },
        },
        Vendor::Garmin => VendorDefaults {
            auth_url: "https://connect.garmin.com/oauthConfirm",
            token_url: "https://connectapi.garmin.com/oauth-service/oauth/exchange/user/2.0",
            revoke_url: None,
            scopes: &["wellness"],
            rate_limit: RateLimitConfig {
                max_requests: 200,
                time_window_secs: 60,
                max_burst: Some(250),
            },
        },
        Vendor::Fitbit => VendorDefaults {
            auth_url: "https://www.fitbit.com/oauth2/authorize",
            token_url: "https://api.fitbit.com/oauth2/token",
            revoke_url: Some("https://api.fitbit.com/oauth2/revoke"),
            scopes: &["activity", "heartrate", "sleep", "profile"],
            // Fitbit enforces 150 requests per user per hour
            rate_limit: RateLimitConfig {
                max_requests: 150,
                time_window_secs: 3600,
                max_burst: None,
            },
        },
    }
}

fn env_key(vendor: Vendor, suffix: &str) -> String {
    format!("{}_{suffix}", vendor.as_str().to_ascii_uppercase())
}

fn required_var(vendor: Vendor, suffix: &str) -> ConnectorResult<String> {
    let key = env_key(vendor, suffix);
    env::var(&key)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConnectorError::OAuth(format!("missing required env var {key}")))
}

fn optional_var(vendor: Vendor, suffix: &str) -> Option<String> {
    env::var(env_key(vendor, suffix))
        .ok()
        .filter(|value| !value.is_empty())
}

/// Load a vendor's configuration from the environment
///
/// `<VENDOR>_CLIENT_ID` and `<VENDOR>_CLIENT_SECRET` are required.
/// `<VENDOR>_REDIRECT_URI`, `<VENDOR>_WEBHOOK_SECRET`, `<VENDOR>_SCOPES`
/// (space-separated), and the OAuth endpoint URLs may override defaults.
///
/// # Errors
///
/// Returns [`ConnectorError::OAuth`] when a required credential is unset
pub fn vendor_config_from_env(vendor: Vendor) -> ConnectorResult<VendorConfig> {
    let base = defaults(vendor);

    let scopes = optional_var(vendor, "SCOPES").map_or_else(
        || base.scopes.iter().map(|s| (*s).to_owned()).collect(),
        |raw| raw.split_whitespace().map(str::to_owned).collect(),
    );

    Ok(VendorConfig {
        vendor,
        client_id: required_var(vendor, "CLIENT_ID")?,
        client_secret: required_var(vendor, "CLIENT_SECRET")?,
        auth_url: optional_var(vendor, "AUTH_URL").unwrap_or_else(|| base.auth_url.to_owned()),
        token_url: optional_var(vendor, "TOKEN_URL").unwrap_or_else(|| base.token_url.to_owned()),
        revoke_url: optional_var(vendor, "REVOKE_URL")
            .or_else(|| base.revoke_url.map(str::to_owned)),
        redirect_uri: optional_var(vendor, "REDIRECT_URI")
            .unwrap_or_else(|| format!("http://localhost:8080/auth/{vendor}/callback")),
        webhook_secret: optional_var(vendor, "WEBHOOK_SECRET"),
        scopes,
        rate_limit: Some(base.rate_limit),
    })
}

/// Default rate limit configuration for a vendor
#[must_use]
pub fn default_rate_limit(vendor: Vendor) -> RateLimitConfig {
    defaults(vendor).rate_limit
}
