// ABOUTME: OAuth 2.0 client for vendor token endpoints with a mockable HTTP port
// ABOUTME: Handles authorization URLs, code exchange, refresh, and best-effort revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # OAuth Client
//!
//! RFC 6749 authorization-code and refresh-token grants against vendor
//! token endpoints. Outbound calls go through the [`HttpPort`] trait so
//! tests can substitute a scripted transport; the production
//! [`ReqwestHttp`] implementation applies a fixed request timeout.
//!
//! Error split: a vendor that answers with non-2xx rejected the grant
//! ([`ConnectorError::OAuth`], not retryable); a transport that never
//! delivered an answer is a [`ConnectorError::VendorApi`] (retryable).

use crate::constants::{http, oauth as oauth_defaults};
use crate::errors::{ConnectorError, ConnectorResult};
use crate::models::OAuthTokenSet;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

/// Outbound HTTP capability for token endpoint calls
#[async_trait]
pub trait HttpPort: Send + Sync {
    /// POST a form-encoded body and return (status, response body)
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::VendorApi`] on transport failure (timeout,
    /// DNS, connection reset). A non-2xx status is NOT an error at this
    /// layer; callers interpret it.
    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> ConnectorResult<(u16, String)>;
}

/// Production HTTP port over reqwest with a fixed request timeout
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    /// Build a client with the default 30 s request timeout
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::VendorApi`] if the TLS backend fails to
    /// initialize
    pub fn new() -> ConnectorResult<Self> {
        Self::with_timeout(StdDuration::from_secs(http::DEFAULT_TIMEOUT_SECS))
    }

    /// Build a client with an explicit request timeout
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::VendorApi`] if the TLS backend fails to
    /// initialize
    pub fn with_timeout(timeout: StdDuration) -> ConnectorResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpPort for ReqwestHttp {
    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> ConnectorResult<(u16, String)> {
        let mut request = self.client.post(url).form(params);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}

/// Raw token response shape shared by the vendors we integrate
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<ScopeField>,
}

/// Vendors disagree on whether `scope` is a string or a list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeField {
    Text(String),
    List(Vec<String>),
}

/// Error payload shape for rejected grants
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_description: Option<String>,
    error: Option<String>,
}

/// OAuth 2.0 client bound to one vendor's endpoints
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    revoke_url: Option<String>,
    http: std::sync::Arc<dyn HttpPort>,
}

impl OAuthClient {
    /// Create a client for one vendor's OAuth endpoints
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        revoke_url: Option<String>,
        http: std::sync::Arc<dyn HttpPort>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            revoke_url,
            http,
        }
    }

    /// Build the consent-redirect URL for the authorization-code flow
    #[must_use]
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        scopes: &[String],
        state: Option<&str>,
        extra_params: &[(&str, &str)],
    ) -> String {
        let scope = scopes.join(" ");
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
        );
        if let Some(state) = state {
            url.push_str(&format!("&state={}", urlencoding::encode(state)));
        }
        for (name, value) in extra_params {
            url.push_str(&format!(
                "&{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            ));
        }
        url
    }

    /// Exchange an authorization code for a token set
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::OAuth`] when the vendor rejects the grant,
    /// or [`ConnectorError::VendorApi`] on transport failure
    pub async fn exchange(&self, code: &str, redirect_uri: &str) -> ConnectorResult<OAuthTokenSet> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        self.token_grant(&params, "token exchange").await
    }

    /// Refresh an expired access token
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::OAuth`] when the vendor rejects the grant,
    /// or [`ConnectorError::VendorApi`] on transport failure
    pub async fn refresh(&self, refresh_token: &str) -> ConnectorResult<OAuthTokenSet> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        self.token_grant(&params, "token refresh").await
    }

    /// Revoke a token with the vendor, best effort
    ///
    /// Vendors without a revocation endpoint succeed trivially. A non-200
    /// answer is logged and reported as `false`; callers invalidate locally
    /// regardless.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::VendorApi`] only on transport failure
    pub async fn revoke(&self, token: &str) -> ConnectorResult<bool> {
        let Some(revoke_url) = self.revoke_url.as_deref() else {
            return Ok(true);
        };

        let params = [
            ("token", token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let (status, _body) = self.http.post_form(revoke_url, &params, &[]).await?;

        // RFC 7009: successful revocations return 200
        if status == 200 {
            Ok(true)
        } else {
            warn!(status, "Vendor revocation endpoint returned non-200");
            Ok(false)
        }
    }

    async fn token_grant(
        &self,
        params: &[(&str, &str)],
        operation: &str,
    ) -> ConnectorResult<OAuthTokenSet> {
        let headers = [("Content-Type", "application/x-www-form-urlencoded")];
        let (status, body) = self.http.post_form(&self.token_url, params, &headers).await?;

        if !(200..300).contains(&status) {
            let detail = grant_error_detail(&body);
            return Err(ConnectorError::OAuth(format!(
                "{operation} failed ({status}): {detail}"
            )));
        }

        debug!(operation, "Vendor token grant succeeded");
        parse_token_response(&body)
    }
}

/// Extract the most specific error text a vendor rejection offers
fn grant_error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error_description.or(e.error))
        .unwrap_or_else(|| body.to_owned())
}

/// Parse a standard token response into an [`OAuthTokenSet`]
///
/// `expires_at` is always recomputed as `now + expires_in` at receipt so a
/// vendor-supplied absolute timestamp can never import their clock skew.
fn parse_token_response(body: &str) -> ConnectorResult<OAuthTokenSet> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| ConnectorError::OAuth(format!("malformed token response: {e}")))?;

    let access_token = response
        .access_token
        .ok_or_else(|| ConnectorError::OAuth("missing access_token in response".into()))?;

    let expires_in = response
        .expires_in
        .unwrap_or(oauth_defaults::DEFAULT_EXPIRES_IN_SECS);
    let expires_at = Utc::now() + Duration::seconds(expires_in);

    let scopes = match response.scope {
        Some(ScopeField::Text(text)) => text
            .split_whitespace()
            .map(std::borrow::ToOwned::to_owned)
            .collect(),
        Some(ScopeField::List(list)) => list,
        None => Vec::new(),
    };

    Ok(OAuthTokenSet {
        access_token,
        refresh_token: response.refresh_token,
        expires_at,
        token_type: response
            .token_type
            .unwrap_or_else(|| oauth_defaults::DEFAULT_TOKEN_TYPE.to_owned()),
        scopes,
    })
}
