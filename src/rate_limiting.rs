// ABOUTME: Token-bucket rate limiting engine, vendor- and user-scoped
// ABOUTME: Lazy refill with a single critical section and no I/O under the lock
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Rate Limiting
//!
//! Token-bucket admission control. Each configured vendor owns one bucket;
//! per-(vendor, user) buckets are created lazily on first check with the
//! vendor's configuration. Refill is computed lazily at check time, so idle
//! buckets cost nothing.
//!
//! The whole lookup-refill-consume sequence runs inside one mutex per
//! limiter instance. Concurrent checks therefore observe a monotonically
//! consistent token count: when one unit of capacity remains, exactly one
//! of two racing checks succeeds. Construct one limiter per process and
//! inject it; nothing here is a global.

use crate::errors::{ConnectorError, ConnectorResult};
use crate::models::{RateLimitConfig, Vendor};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

/// One token bucket: capped capacity refilled continuously at a fixed rate
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Capacity ceiling; tokens never exceed this regardless of idle time
    pub max_tokens: f64,
    /// Refill rate in tokens per second
    pub refill_rate: f64,
    /// Currently available tokens, in `[0, max_tokens]`
    pub tokens: f64,
    /// When tokens were last reconciled with elapsed time
    pub last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket from a vendor configuration
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let max_tokens = f64::from(config.max_burst.unwrap_or(config.max_requests));
        let refill_rate = f64::from(config.max_requests) / f64::from(config.time_window_secs);
        Self {
            max_tokens,
            refill_rate,
            tokens: max_tokens,
            last_refill: Instant::now(),
        }
    }

    /// Try to consume `cost` tokens, refilling first
    pub fn consume(&mut self, cost: f64) -> bool {
        self.refill();
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Reconcile tokens with elapsed time, capped at `max_tokens`
    pub fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Whole seconds until `cost` tokens are available, 0 if available now
    #[must_use]
    pub fn retry_after(&self, cost: f64) -> u64 {
        if self.tokens >= cost {
            return 0;
        }
        let needed = cost - self.tokens;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        // Safe: ceil of a small positive quotient fits comfortably in u64
        let secs = (needed / self.refill_rate).ceil() as u64;
        secs.max(1)
    }

    /// Restore the bucket to full and reset the refill clock
    pub fn reset(&mut self) {
        self.tokens = self.max_tokens;
        self.last_refill = Instant::now();
    }
}

/// Remaining capacity for one bucket scope
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct BucketStatus {
    pub remaining: u32,
    pub max: u32,
}

/// Remaining capacity for a (vendor, user) query
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RateLimitStatus {
    pub vendor: Option<BucketStatus>,
    pub user: Option<BucketStatus>,
}

#[derive(Default)]
struct LimiterState {
    configs: HashMap<Vendor, RateLimitConfig>,
    vendor_buckets: HashMap<Vendor, TokenBucket>,
    user_buckets: HashMap<String, TokenBucket>,
}

/// Thread-safe token-bucket rate limiter
#[derive(Default)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create an empty limiter; vendors are fail-open until configured
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure limits for a vendor, resetting its bucket to full
    pub fn configure(&self, vendor: Vendor, config: RateLimitConfig) {
        let mut state = self.lock();
        state.vendor_buckets.insert(vendor, TokenBucket::from_config(&config));
        state.configs.insert(vendor, config);
        debug!(vendor = %vendor, max_requests = config.max_requests, "Configured rate limit");
    }

    /// Admit or reject a request costing `cost` tokens
    ///
    /// The vendor-level bucket is evaluated first and short-circuits before
    /// the per-user bucket consumes anything. Unconfigured vendors pass
    /// unconditionally: absence of configuration is not a constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::RateLimit`] with a `retry_after` hint when
    /// either bucket lacks capacity
    pub fn check(&self, vendor: Vendor, user_id: Option<&str>, cost: f64) -> ConnectorResult<()> {
        let mut state = self.lock();
        let Some(config) = state.configs.get(&vendor).copied() else {
            return Ok(());
        };

        if let Some(bucket) = state.vendor_buckets.get_mut(&vendor) {
            if !bucket.consume(cost) {
                let retry_after = bucket.retry_after(cost);
                return Err(ConnectorError::RateLimit {
                    message: format!("vendor rate limit exceeded for {vendor}"),
                    retry_after,
                });
            }
        }

        if let Some(user_id) = user_id {
            let key = format!("{vendor}:{user_id}");
            let bucket = state
                .user_buckets
                .entry(key.clone())
                .or_insert_with(|| TokenBucket::from_config(&config));
            if !bucket.consume(cost) {
                let retry_after = bucket.retry_after(cost);
                return Err(ConnectorError::RateLimit {
                    message: format!("user rate limit exceeded for {key}"),
                    retry_after,
                });
            }
        }

        Ok(())
    }

    /// Remaining tokens for a vendor and, when given, one of its users
    #[must_use]
    pub fn remaining(&self, vendor: Vendor, user_id: Option<&str>) -> RateLimitStatus {
        let mut state = self.lock();
        let mut status = RateLimitStatus::default();

        if let Some(bucket) = state.vendor_buckets.get_mut(&vendor) {
            bucket.refill();
            status.vendor = Some(Self::snapshot(bucket));
        }

        if let Some(user_id) = user_id {
            let key = format!("{vendor}:{user_id}");
            if let Some(bucket) = state.user_buckets.get_mut(&key) {
                bucket.refill();
                status.user = Some(Self::snapshot(bucket));
            }
        }

        status
    }

    /// Reset buckets to full capacity
    ///
    /// Scope depends on arguments: vendor plus user resets both matching
    /// buckets, vendor alone resets the vendor bucket, and no vendor resets
    /// everything.
    pub fn reset(&self, vendor: Option<Vendor>, user_id: Option<&str>) {
        let mut state = self.lock();
        match vendor {
            Some(vendor) => {
                if let Some(bucket) = state.vendor_buckets.get_mut(&vendor) {
                    bucket.reset();
                }
                if let Some(user_id) = user_id {
                    let key = format!("{vendor}:{user_id}");
                    if let Some(bucket) = state.user_buckets.get_mut(&key) {
                        bucket.reset();
                    }
                }
            }
            None => {
                for bucket in state.vendor_buckets.values_mut() {
                    bucket.reset();
                }
                for bucket in state.user_buckets.values_mut() {
                    bucket.reset();
                }
            }
        }
    }

    fn snapshot(bucket: &TokenBucket) -> BucketStatus {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        // Safe: token counts originate from u32 configuration values
        BucketStatus {
            remaining: bucket.tokens as u32,
            max: bucket.max_tokens as u32,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        // A poisoned lock means a panic mid-update; state is still usable
        // because every mutation leaves the maps structurally intact.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(max_requests: u32, window: u32) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            time_window_secs: window,
            max_burst: None,
        }
    }

    #[test]
    fn refill_is_proportional_and_capped() {
        let mut bucket = TokenBucket::from_config(&config(10, 10));
        bucket.tokens = 0.0;
        bucket.last_refill = Instant::now() - Duration::from_secs(3);
        bucket.refill();
        // 1 token/s for 3 idle seconds
        assert!((bucket.tokens - 3.0).abs() < 0.1);

        bucket.last_refill = Instant::now() - Duration::from_secs(3600);
        bucket.refill();
        assert!((bucket.tokens - bucket.max_tokens).abs() < f64::EPSILON);
    }

    #[test]
    fn tokens_stay_within_bounds() {
        let mut bucket = TokenBucket::from_config(&config(5, 60));
        for _ in 0..20 {
            bucket.consume(1.0);
            assert!(bucket.tokens >= 0.0);
            assert!(bucket.tokens <= bucket.max_tokens);
        }
    }

    #[test]
    fn burst_overrides_capacity() {
        let bucket = TokenBucket::from_config(&RateLimitConfig {
            max_requests: 10,
            time_window_secs: 60,
            max_burst: Some(25),
        });
        assert!((bucket.max_tokens - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn retry_after_rounds_up() {
        let mut bucket = TokenBucket::from_config(&config(2, 60));
        bucket.tokens = 0.5;
        // Needs 0.5 more tokens at 1/30 tokens per second => 15 s
        assert_eq!(bucket.retry_after(1.0), 15);
    }

    #[test]
    fn unconfigured_vendor_is_fail_open() {
        let limiter = RateLimiter::new();
        for _ in 0..100 {
            limiter.check(Vendor::Garmin, Some("u1"), 1.0).unwrap();
        }
    }

    #[test]
    fn vendor_bucket_short_circuits_before_user_bucket() {
        let limiter = RateLimiter::new();
        limiter.configure(Vendor::Whoop, config(1, 60));

        limiter.check(Vendor::Whoop, Some("u1"), 1.0).unwrap();
        let err = limiter.check(Vendor::Whoop, Some("u2"), 1.0).unwrap_err();
        assert!(matches!(err, ConnectorError::RateLimit { .. }));

        // u2's bucket was never created, let alone drained
        let status = limiter.remaining(Vendor::Whoop, Some("u2"));
        assert!(status.user.is_none());
    }

    #[test]
    fn reset_scopes_apply_independently() {
        let limiter = RateLimiter::new();
        limiter.configure(Vendor::Fitbit, config(2, 60));
        limiter.check(Vendor::Fitbit, Some("u1"), 2.0).unwrap();

        let drained = limiter.remaining(Vendor::Fitbit, Some("u1"));
        assert_eq!(drained.vendor.unwrap().remaining, 0);
        assert_eq!(drained.user.unwrap().remaining, 0);

        limiter.reset(Some(Vendor::Fitbit), Some("u1"));
        let restored = limiter.remaining(Vendor::Fitbit, Some("u1"));
        assert_eq!(restored.vendor.unwrap().remaining, 2);
        assert_eq!(restored.user.unwrap().remaining, 2);
    }
}
