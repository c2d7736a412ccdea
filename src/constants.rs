// ABOUTME: Application constants and default tunables shared across subsystems
// ABOUTME: Centralizes retry budgets, replay windows, and environment variable names
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Default tunables for the connector core.
//!
//! Values here are compiled-in defaults; most can be overridden through
//! [`crate::config`] at construction time.

/// Retry and backoff budgets for the job queue
pub mod retries {
    /// Maximum requeue attempts before a message is permanently failed
    pub const MAX_RETRIES: u32 = 5;

    /// Base delay for the first requeue, in seconds
    pub const BACKOFF_BASE_SECS: u64 = 60;

    /// Ceiling on any single backoff delay, in seconds (15 minutes)
    pub const BACKOFF_CAP_SECS: u64 = 900;
}

/// Webhook verification defaults
pub mod webhooks {
    /// Maximum allowed skew between a signed timestamp and verification time
    pub const DEFAULT_REPLAY_WINDOW_SECS: i64 = 180;
}

/// Outbound HTTP defaults
pub mod http {
    /// Request timeout for token exchange, refresh, and revocation calls
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
}

/// OAuth protocol defaults
pub mod oauth {
    /// Assumed token lifetime when the vendor omits `expires_in`
    pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

    /// Token type reported when the vendor omits `token_type`
    pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";
}

/// Queue defaults
pub mod queue {
    /// Long-polling wait for receive calls, in seconds
    pub const DEFAULT_WAIT_SECS: u64 = 20;

    /// Maximum messages returned by a single receive call
    pub const DEFAULT_MAX_MESSAGES: usize = 10;

    /// Window within which duplicate dedup ids collapse to one message
    pub const DEDUP_WINDOW_SECS: i64 = 300;
}

/// Environment variable names
pub mod env_vars {
    /// Base64-encoded 32-byte master encryption key
    pub const MASTER_ENCRYPTION_KEY: &str = "WEARSYNC_MASTER_ENCRYPTION_KEY";
}
