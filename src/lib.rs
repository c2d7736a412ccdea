// ABOUTME: Main library entry point for the wearsync connector core
// ABOUTME: Brokers OAuth integrations with wearable vendors behind typed, injectable ports
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Wearsync Connector
//!
//! Resilience core for OAuth-authenticated wearable-device integrations.
//! Exchanges and refreshes vendor access tokens, stores them encrypted with
//! append-only versioning, validates inbound webhook signatures against
//! replay, enforces per-vendor and per-user token-bucket budgets, and queues
//! verified events for downstream processing with idempotent delivery and
//! bounded exponential backoff.
//!
//! ## Architecture
//!
//! External capabilities (storage, queue, crypto, HTTP) are modeled as
//! traits so production backends and in-memory test doubles are
//! interchangeable:
//! - **Crypto**: token encryption at rest ([`crypto`])
//! - **Tokens**: encrypted, versioned token vault ([`tokens`])
//! - **OAuth**: authorization-code and refresh-token grants ([`oauth`])
//! - **Rate limiting**: vendor- and user-scoped token buckets ([`rate_limiting`])
//! - **Webhooks**: HMAC signature and replay-window validation ([`webhooks`])
//! - **Jobs**: idempotent enqueue with backoff requeue ([`jobs`])
//! - **Connectors**: per-vendor composition of the above ([`connectors`])

/// Configuration loading from environment variables
pub mod config;

/// Per-vendor connector composition and vendor webhook hooks
pub mod connectors;

/// Application constants and default tunables
pub mod constants;

/// Cryptographic utilities and key management
pub mod crypto;

/// Unified error handling with typed retryability
pub mod errors;

/// Job queue with idempotent dedup and exponential backoff
pub mod jobs;

/// Production logging and structured output
pub mod logging;

/// Common data models shared across subsystems
pub mod models;

/// OAuth 2.0 client for vendor token endpoints
pub mod oauth;

/// Token-bucket rate limiting, vendor- and user-scoped
pub mod rate_limiting;

/// Incremental sync cursors for backfill and delta pulls
pub mod sync_state;

/// Encrypted token vault with append-only versioning
pub mod tokens;

/// Webhook signature verification and replay protection
pub mod webhooks;
