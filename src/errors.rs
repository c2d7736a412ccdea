// ABOUTME: Unified error handling for the connector core with typed retryability
// ABOUTME: Maps every failure mode to one of six kinds consumed by boundary layers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Unified Error Handling
//!
//! Every fallible operation in the connector core returns [`ConnectorError`].
//! Callers at the transport boundary map these kinds to responses; retry
//! workers consult [`ConnectorError::is_retryable`] and
//! [`ConnectorError::retry_after`] instead of matching on variants.

use thiserror::Error;

/// Result type alias for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Unified error type for the connector core
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Vendor rejected an OAuth grant, or a token expired with no refresh
    /// path. Requires user re-consent; never retried automatically.
    #[error("OAuth failure: {0}")]
    OAuth(String),

    /// Token storage or crypto backend failure. Retryable when the backend
    /// hiccup is transient.
    #[error("token storage failure: {0}")]
    Token(String),

    /// No token record exists for the requested (vendor, user)
    #[error("tokens not found for {0}")]
    TokenNotFound(String),

    /// Webhook signature, timestamp, or parse failure. The request is
    /// rejected and never retried.
    #[error("webhook verification failed: {0}")]
    Webhook(String),

    /// Local or vendor quota exceeded; safe to retry after `retry_after`
    #[error("rate limit exceeded: {message} (retry after {retry_after}s)")]
    RateLimit {
        /// Which bucket rejected the request
        message: String,
        /// Seconds until enough capacity refills
        retry_after: u64,
    },

    /// Queue backend failure or exhausted retry budget; the message is dead
    #[error("enqueue failed: {0}")]
    Enqueue(String),

    /// Upstream 5xx, timeout, or network-level failure. Retryable with
    /// backoff.
    #[error("vendor API failure: {message}")]
    VendorApi {
        /// Transport or vendor error description
        message: String,
        /// HTTP status when the vendor answered at all
        status: Option<u16>,
    },
}

impl ConnectorError {
    /// Whether a caller may retry the failed operation
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Token(_) | Self::RateLimit { .. } | Self::VendorApi { .. } => true,
            Self::OAuth(_) | Self::TokenNotFound(_) | Self::Webhook(_) | Self::Enqueue(_) => false,
        }
    }

    /// Seconds to wait before retrying, when the error prescribes one
    #[must_use]
    pub const fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Stable machine-readable code for boundary-layer response mapping
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OAuth(_) => "oauth",
            Self::Token(_) => "token",
            Self::TokenNotFound(_) => "token_not_found",
            Self::Webhook(_) => "webhook",
            Self::RateLimit { .. } => "rate_limit",
            Self::Enqueue(_) => "enqueue",
            Self::VendorApi { .. } => "vendor_api",
        }
    }

    /// Build a `VendorApi` error from a vendor response status and body
    #[must_use]
    pub fn vendor_status(status: u16, message: impl Into<String>) -> Self {
        Self::VendorApi {
            message: message.into(),
            status: Some(status),
        }
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        // Transport-level failures (timeout, DNS, reset) signal retryability
        Self::VendorApi {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Token(format!("serialization failed: {err}"))
    }
}
