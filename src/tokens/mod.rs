// ABOUTME: Encrypted token vault with append-only versioning per (vendor, user)
// ABOUTME: Encrypts tokens through the crypto port and keeps revoked records as audit trail
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Token Vault
//!
//! Stores OAuth token sets encrypted at rest. Every save appends a new
//! record version keyed by its creation timestamp; readers only ever see
//! the newest `active` record. Revocation flips the status on the current
//! version in place - the one mutation allowed - so the full history
//! survives as an audit trail.

pub mod storage;

pub use storage::{MemoryTokenStore, TokenStore};

use crate::crypto::TokenCipher;
use crate::errors::{ConnectorError, ConnectorResult};
use crate::models::{OAuthTokenSet, TokenMetadata, TokenRecord, TokenStatus, Vendor};
use base64::{engine::general_purpose, Engine};
use chrono::{SecondsFormat, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Encrypted token storage keyed by (vendor, user)
pub struct TokenVault {
    store: Arc<dyn TokenStore>,
    cipher: Arc<dyn TokenCipher>,
}

impl TokenVault {
    /// Create a vault over a storage backend and cipher
    pub fn new(store: Arc<dyn TokenStore>, cipher: Arc<dyn TokenCipher>) -> Self {
        Self { store, cipher }
    }

    /// Encrypt and persist a token set as a new record version
    ///
    /// Access and refresh tokens are encrypted independently so a partial
    /// leak of one ciphertext never exposes the other.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] if encryption or the storage write
    /// fails; no partial write is ever reported as success
    pub async fn save(
        &self,
        vendor: Vendor,
        user_id: &str,
        tokens: &OAuthTokenSet,
        vendor_meta: HashMap<String, String>,
    ) -> ConnectorResult<TokenRecord> {
        let access_enc = self.encrypt_field(&tokens.access_token)?;
        let refresh_enc = tokens
            .refresh_token
            .as_deref()
            .map(|token| self.encrypt_field(token))
            .transpose()?;

        let record = TokenRecord {
            pk: TokenRecord::partition_key(vendor, user_id),
            sk: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            access_token: access_enc,
            refresh_token: refresh_enc,
            expires_at: tokens.expires_at.timestamp(),
            token_type: tokens.token_type.clone(),
            scopes: tokens.scopes.clone(),
            status: TokenStatus::Active,
            vendor_meta,
        };

        self.store.put(record.clone()).await?;
        debug!(vendor = %vendor, user_id, version = %record.sk, "Saved token record");
        Ok(record)
    }

    /// Decrypt and return the current active token set, if any
    ///
    /// Revoked, expired, and pending records are invisible to readers
    /// without being deleted. A missing partition is a normal empty result.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] if storage or decryption fails
    pub async fn get(&self, vendor: Vendor, user_id: &str) -> ConnectorResult<Option<OAuthTokenSet>> {
        let pk = TokenRecord::partition_key(vendor, user_id);
        let Some(record) = self.store.get_latest(&pk).await? else {
            return Ok(None);
        };

        if record.status != TokenStatus::Active {
            return Ok(None);
        }

        let access_token = self.decrypt_field(&record.access_token)?;
        let refresh_token = record
            .refresh_token
            .as_deref()
            .map(|ciphertext| self.decrypt_field(ciphertext))
            .transpose()?;

        let expires_at = Utc
            .timestamp_opt(record.expires_at, 0)
            .single()
            .ok_or_else(|| {
                ConnectorError::Token(format!("invalid expiry {} in {pk}", record.expires_at))
            })?;

        Ok(Some(OAuthTokenSet {
            access_token,
            refresh_token,
            expires_at,
            token_type: record.token_type,
            scopes: record.scopes,
        }))
    }

    /// Mark the current record revoked in place
    ///
    /// Terminal: no further status transitions occur and the record remains
    /// stored for audit.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::TokenNotFound`] when no record exists, or
    /// [`ConnectorError::Token`] on backend failure
    pub async fn revoke(&self, vendor: Vendor, user_id: &str) -> ConnectorResult<()> {
        let pk = TokenRecord::partition_key(vendor, user_id);
        let updated = self.store.update_status(&pk, TokenStatus::Revoked).await?;
        if !updated {
            return Err(ConnectorError::TokenNotFound(pk));
        }
        debug!(vendor = %vendor, user_id, "Revoked token record");
        Ok(())
    }

    /// List record metadata, optionally filtered, without decrypting secrets
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    pub async fn scan(
        &self,
        vendor: Option<Vendor>,
        status: Option<TokenStatus>,
    ) -> ConnectorResult<Vec<TokenMetadata>> {
        let records = self.store.scan().await?;
        Ok(records
            .into_iter()
            .filter_map(|record| {
                let (record_vendor, user_id) = record.pk.split_once(':')?;
                if let Some(wanted) = vendor {
                    if record_vendor != wanted.as_str() {
                        return None;
                    }
                }
                if let Some(wanted) = status {
                    if record.status != wanted {
                        return None;
                    }
                }
                Some(TokenMetadata {
                    vendor: record_vendor.to_owned(),
                    user_id: user_id.to_owned(),
                    status: record.status,
                    expires_at: record.expires_at,
                    scopes: record.scopes,
                    created_at: record.sk,
                })
            })
            .collect())
    }

    fn encrypt_field(&self, plaintext: &str) -> ConnectorResult<String> {
        let ciphertext = self.cipher.encrypt(plaintext.as_bytes())?;
        Ok(general_purpose::STANDARD.encode(ciphertext))
    }

    fn decrypt_field(&self, encoded: &str) -> ConnectorResult<String> {
        let ciphertext = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ConnectorError::Token(format!("invalid base64 ciphertext: {e}")))?;
        let plaintext = self.cipher.decrypt(&ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|e| ConnectorError::Token(format!("decrypted token is not utf-8: {e}")))
    }
}
