// ABOUTME: Incremental sync cursors tracking last pull time per (vendor, user)
// ABOUTME: Supports delta pulls, pagination resume, and forced full resyncs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Sync State
//!
//! Tracks where each user's incremental data pull left off. Workers read
//! the cursor before pulling, then update it with the new high-water mark
//! and the number of records synced. Resetting a cursor forces the next
//! pull to run as a full sync.

use crate::errors::{ConnectorError, ConnectorResult};
use crate::models::{SyncCursor, Vendor};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage capability for sync cursors
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Upsert a cursor
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    async fn put(&self, cursor: SyncCursor) -> ConnectorResult<()>;

    /// Fetch the cursor for a (vendor, user), if one exists
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    async fn get(&self, vendor: Vendor, user_id: &str) -> ConnectorResult<Option<SyncCursor>>;

    /// Remove a cursor; absent cursors remove trivially
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    async fn remove(&self, vendor: Vendor, user_id: &str) -> ConnectorResult<()>;

    /// List all cursors
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    async fn list(&self) -> ConnectorResult<Vec<SyncCursor>>;
}

fn cursor_key(vendor: Vendor, user_id: &str) -> String {
    format!("SYNC#{vendor}#{user_id}")
}

/// In-memory cursor store for tests and local development
#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<HashMap<String, SyncCursor>>,
}

impl MemoryCursorStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn put(&self, cursor: SyncCursor) -> ConnectorResult<()> {
        let key = cursor_key(cursor.vendor, &cursor.user_id);
        self.cursors.write().await.insert(key, cursor);
        Ok(())
    }

    async fn get(&self, vendor: Vendor, user_id: &str) -> ConnectorResult<Option<SyncCursor>> {
        Ok(self
            .cursors
            .read()
            .await
            .get(&cursor_key(vendor, user_id))
            .cloned())
    }

    async fn remove(&self, vendor: Vendor, user_id: &str) -> ConnectorResult<()> {
        self.cursors.write().await.remove(&cursor_key(vendor, user_id));
        Ok(())
    }

    async fn list(&self) -> ConnectorResult<Vec<SyncCursor>> {
        Ok(self.cursors.read().await.values().cloned().collect())
    }
}

/// Sync cursor management over a cursor store
pub struct SyncState {
    store: Arc<dyn CursorStore>,
}

impl SyncState {
    /// Create a manager over a cursor store
    pub fn new(store: Arc<dyn CursorStore>) -> Self {
        Self { store }
    }

    /// Fetch the cursor for a (vendor, user)
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    pub async fn get_cursor(
        &self,
        vendor: Vendor,
        user_id: &str,
    ) -> ConnectorResult<Option<SyncCursor>> {
        self.store.get(vendor, user_id).await
    }

    /// Record a successful pull
    ///
    /// `records_synced` accumulates across updates; `created_at` is
    /// preserved from the first cursor write.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure or a malformed
    /// timestamp
    pub async fn update_cursor(
        &self,
        vendor: Vendor,
        user_id: &str,
        last_sync_ts: &str,
        records_synced: u64,
        last_resource_id: Option<String>,
    ) -> ConnectorResult<SyncCursor> {
        if chrono::DateTime::parse_from_rfc3339(last_sync_ts).is_err() {
            return Err(ConnectorError::Token(format!(
                "invalid sync timestamp: {last_sync_ts}"
            )));
        }

        let now = Utc::now().to_rfc3339();
        let existing = self.store.get(vendor, user_id).await?;
        let total = existing
            .as_ref()
            .map_or(0, |cursor| cursor.records_synced)
            .saturating_add(records_synced);

        let cursor = SyncCursor {
            vendor,
            user_id: user_id.to_owned(),
            last_sync_ts: last_sync_ts.to_owned(),
            records_synced: total,
            last_resource_id,
            created_at: existing.map_or_else(|| now.clone(), |cursor| cursor.created_at),
            updated_at: now,
        };

        self.store.put(cursor.clone()).await?;
        debug!(vendor = %vendor, user_id, last_sync_ts, "Updated sync cursor");
        Ok(cursor)
    }

    /// Drop the cursor so the next pull runs as a full sync
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    pub async fn reset_cursor(&self, vendor: Vendor, user_id: &str) -> ConnectorResult<()> {
        self.store.remove(vendor, user_id).await
    }

    /// List cursors, optionally filtered by vendor
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    pub async fn list_cursors(&self, vendor: Option<Vendor>) -> ConnectorResult<Vec<SyncCursor>> {
        let mut cursors = self.store.list().await?;
        if let Some(wanted) = vendor {
            cursors.retain(|cursor| cursor.vendor == wanted);
        }
        Ok(cursors)
    }

    /// Just the last sync timestamp, when one exists
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    pub async fn last_sync_timestamp(
        &self,
        vendor: Vendor,
        user_id: &str,
    ) -> ConnectorResult<Option<String>> {
        Ok(self
            .get_cursor(vendor, user_id)
            .await?
            .map(|cursor| cursor.last_sync_ts))
    }

    /// Whether this user has ever completed a sync
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    pub async fn has_synced_before(&self, vendor: Vendor, user_id: &str) -> ConnectorResult<bool> {
        Ok(self.get_cursor(vendor, user_id).await?.is_some())
    }
}
