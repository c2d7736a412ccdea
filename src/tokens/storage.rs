// ABOUTME: Storage port for versioned token records with a pluggable backend
// ABOUTME: Ships an in-memory implementation for tests and local development
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Token record storage abstraction.
//!
//! Production deployments back this with a partitioned key-value store;
//! the in-memory [`MemoryTokenStore`] mirrors the same semantics (versioned
//! records per partition, conditional status updates) for tests and local
//! runs.

use crate::errors::{ConnectorError, ConnectorResult};
use crate::models::{TokenRecord, TokenStatus};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Storage capability consumed by the token vault
///
/// Records are versioned by sort key within a partition. Implementations
/// never delete records; revocation is a status flip on the newest version.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a new record version
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    async fn put(&self, record: TokenRecord) -> ConnectorResult<()>;

    /// Fetch the newest record in a partition by descending sort key
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure; an empty
    /// partition is `Ok(None)`, never an error
    async fn get_latest(&self, pk: &str) -> ConnectorResult<Option<TokenRecord>>;

    /// Update the status field of the newest record, only if one exists
    ///
    /// Returns whether a record was updated.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    async fn update_status(&self, pk: &str, status: TokenStatus) -> ConnectorResult<bool>;

    /// List every record version across all partitions
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Token`] on backend failure
    async fn scan(&self) -> ConnectorResult<Vec<TokenRecord>>;
}

/// In-memory token store for tests and local development
///
/// Partitions map sort keys to records; `BTreeMap` ordering gives newest-by
/// descending-sort-key lookups for free.
#[derive(Default)]
pub struct MemoryTokenStore {
    partitions: RwLock<BTreeMap<String, BTreeMap<String, TokenRecord>>>,
}

impl MemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of record versions in one partition, for audit assertions
    pub async fn version_count(&self, pk: &str) -> usize {
        self.partitions
            .read()
            .await
            .get(pk)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put(&self, record: TokenRecord) -> ConnectorResult<()> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(record.pk.clone()).or_default();
        if partition.contains_key(&record.sk) {
            return Err(ConnectorError::Token(format!(
                "duplicate record version {}/{}",
                record.pk, record.sk
            )));
        }
        partition.insert(record.sk.clone(), record);
        Ok(())
    }

    async fn get_latest(&self, pk: &str) -> ConnectorResult<Option<TokenRecord>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(pk)
            .and_then(|partition| partition.values().next_back().cloned()))
    }

    async fn update_status(&self, pk: &str, status: TokenStatus) -> ConnectorResult<bool> {
        let mut partitions = self.partitions.write().await;
        let Some(partition) = partitions.get_mut(pk) else {
            return Ok(false);
        };
        let Some(record) = partition.values_mut().next_back() else {
            return Ok(false);
        };
        record.status = status;
        Ok(true)
    }

    async fn scan(&self) -> ConnectorResult<Vec<TokenRecord>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .values()
            .flat_map(|partition| partition.values().cloned())
            .collect())
    }
}
