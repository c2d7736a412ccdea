// ABOUTME: Master encryption key management and AES-256-GCM token encryption
// ABOUTME: Loads the key from the environment or generates one for development
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Key management for token encryption at rest.
//!
//! The master key is loaded from `WEARSYNC_MASTER_ENCRYPTION_KEY`
//! (base64, 32 bytes). In development, a random key is generated and logged
//! so operators can promote it to the environment. [`PlaintextCodec`] is a
//! deliberate non-cipher for local setups without key material; it is a
//! separate type so it can never silently stand in where real encryption is
//! expected.

use crate::constants::env_vars;
use crate::crypto::TokenCipher;
use crate::errors::{ConnectorError, ConnectorResult};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};
use base64::{engine::general_purpose, Engine};
use rand::RngCore;
use std::env;
use tracing::{info, warn};
use zeroize::Zeroize;

/// Length of the AES-GCM nonce prepended to every ciphertext
const NONCE_LEN: usize = 12;

/// Master Encryption Key for token storage
///
/// Wraps a 32-byte AES-256-GCM key. Every ciphertext carries its own random
/// nonce in the first 12 bytes.
pub struct MasterEncryptionKey {
    key: [u8; 32],
}

impl MasterEncryptionKey {
    /// Create a key from raw bytes - primarily for testing
    #[must_use]
    pub const fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Load the key from the environment, or generate one for development
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variable holds invalid base64 or
    /// a key that is not exactly 32 bytes
    pub fn load_or_generate() -> ConnectorResult<Self> {
        if let Ok(encoded) = env::var(env_vars::MASTER_ENCRYPTION_KEY) {
            return Self::load_from_environment(&encoded);
        }
        Ok(Self::generate_for_development())
    }

    fn load_from_environment(encoded: &str) -> ConnectorResult<Self> {
        info!("Loading master encryption key from environment");
        let mut key_bytes = general_purpose::STANDARD.decode(encoded).map_err(|e| {
            ConnectorError::Token(format!(
                "invalid base64 in {}: {e}",
                env_vars::MASTER_ENCRYPTION_KEY
            ))
        })?;

        if key_bytes.len() != 32 {
            key_bytes.zeroize();
            return Err(ConnectorError::Token(format!(
                "master encryption key must be exactly 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        key_bytes.zeroize();
        Ok(Self { key })
    }

    fn generate_for_development() -> Self {
        warn!(
            "{} not found in environment",
            env_vars::MASTER_ENCRYPTION_KEY
        );
        warn!("Generating temporary master key for development - NOT SECURE FOR PRODUCTION");

        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);

        let encoded = general_purpose::STANDARD.encode(key);
        warn!(
            "Generated key (save for production): {}={}",
            env_vars::MASTER_ENCRYPTION_KEY,
            encoded
        );

        Self { key }
    }
}

impl TokenCipher for MasterEncryptionKey {
    fn encrypt(&self, plaintext: &[u8]) -> ConnectorResult<Vec<u8>> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| ConnectorError::Token(format!("encryption failed: {e}")))?;

        // Prepend nonce so decryption is self-contained
        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> ConnectorResult<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN {
            return Err(ConnectorError::Token("ciphertext too short".into()));
        }

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let nonce = GenericArray::from_slice(&ciphertext[..NONCE_LEN]);

        cipher
            .decrypt(nonce, &ciphertext[NONCE_LEN..])
            .map_err(|e| ConnectorError::Token(format!("decryption failed: {e}")))
    }
}

impl Drop for MasterEncryptionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Reversible base64 codec for local development without key material
///
/// Not encryption. Kept as a distinct type so call sites that require real
/// encryption cannot receive it by accident; constructing one warns loudly.
pub struct PlaintextCodec;

impl PlaintextCodec {
    /// Create the development codec, warning that data is not protected
    #[must_use]
    pub fn new() -> Self {
        warn!("PlaintextCodec in use - tokens are base64 encoded, NOT encrypted");
        Self
    }
}

impl Default for PlaintextCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCipher for PlaintextCodec {
    fn encrypt(&self, plaintext: &[u8]) -> ConnectorResult<Vec<u8>> {
        Ok(general_purpose::STANDARD
            .encode(plaintext)
            .into_bytes())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> ConnectorResult<Vec<u8>> {
        general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|e| ConnectorError::Token(format!("invalid base64 payload: {e}")))
    }
}
