// ABOUTME: Cryptography module providing token encryption and key management
// ABOUTME: Centralizes all cryptographic operations for the connector core
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Cryptographic utilities for token storage.
//!
//! The vault encrypts tokens through the [`TokenCipher`] trait so the real
//! AES-256-GCM cipher and the development fallback stay interchangeable at
//! construction time and nowhere else.

pub mod keys;

pub use keys::{MasterEncryptionKey, PlaintextCodec};

use crate::errors::ConnectorResult;

/// Encryption capability consumed by the token vault
///
/// Implementations must be deterministic about failure: a ciphertext that
/// cannot be decrypted is an error, never an empty result.
pub trait TokenCipher: Send + Sync {
    /// Encrypt plaintext bytes
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ConnectorError::Token`] if encryption fails
    fn encrypt(&self, plaintext: &[u8]) -> ConnectorResult<Vec<u8>>;

    /// Decrypt ciphertext bytes
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ConnectorError::Token`] if the ciphertext is
    /// malformed or the key does not match
    fn decrypt(&self, ciphertext: &[u8]) -> ConnectorResult<Vec<u8>>;
}
