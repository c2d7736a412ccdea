// ABOUTME: Queue port for dedup-aware message delivery with a pluggable backend
// ABOUTME: Ships an in-memory implementation with dedup window for tests and local use
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Queue transport abstraction.
//!
//! Production deployments back this with a FIFO queue service supporting
//! content deduplication and ordering groups. [`MemoryQueue`] mirrors those
//! semantics - a dedup window collapsing repeated dedup ids and delayed
//! visibility - in process, for tests and local development.

use crate::constants::queue::DEDUP_WINDOW_SECS;
use crate::errors::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Queue capability consumed by the job queue
#[async_trait]
pub trait QueuePort: Send + Sync {
    /// Send a message body; duplicate `dedup_id`s within the backend's
    /// dedup window collapse to the original message
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Enqueue`] on backend failure
    async fn send(
        &self,
        body: String,
        dedup_id: &str,
        group_id: &str,
        delay_secs: u64,
    ) -> ConnectorResult<String>;

    /// Receive up to `max_messages` visible messages, long-polling up to
    /// `wait_secs`; returns (body, delete token) pairs
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Enqueue`] on backend failure
    async fn receive(
        &self,
        max_messages: usize,
        wait_secs: u64,
    ) -> ConnectorResult<Vec<(String, String)>>;

    /// Acknowledge a received message so it is never redelivered
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Enqueue`] when the delete token is unknown
    /// or the backend fails
    async fn delete(&self, delete_token: &str) -> ConnectorResult<()>;
}

struct QueuedEntry {
    message_id: String,
    body: String,
    group_id: String,
    visible_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    entries: Vec<QueuedEntry>,
    /// dedup_id -> (message id, first-seen time)
    dedup: HashMap<String, (String, DateTime<Utc>)>,
    /// delete token -> message id, for in-flight messages
    in_flight: HashMap<String, String>,
}

/// In-memory queue for tests and local development
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently queued (visible or delayed), for assertions
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no messages are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl QueuePort for MemoryQueue {
    async fn send(
        &self,
        body: String,
        dedup_id: &str,
        group_id: &str,
        delay_secs: u64,
    ) -> ConnectorResult<String> {
        let now = Utc::now();
        let mut state = self.lock();

        // Collapse duplicates still inside the dedup window
        if let Some((existing_id, seen_at)) = state.dedup.get(dedup_id) {
            if now - *seen_at < Duration::seconds(DEDUP_WINDOW_SECS) {
                return Ok(existing_id.clone());
            }
        }

        let message_id = Uuid::new_v4().to_string();
        state
            .dedup
            .insert(dedup_id.to_owned(), (message_id.clone(), now));
        state.entries.push(QueuedEntry {
            message_id: message_id.clone(),
            body,
            group_id: group_id.to_owned(),
            // Clamp to a day; chrono durations overflow long before u64 does
            visible_at: now
                + Duration::seconds(i64::try_from(delay_secs).unwrap_or(86_400).min(86_400)),
        });
        Ok(message_id)
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait_secs: u64,
    ) -> ConnectorResult<Vec<(String, String)>> {
        let deadline = Utc::now() + Duration::seconds(i64::try_from(wait_secs).unwrap_or(0));

        loop {
            let batch = {
                let now = Utc::now();
                let mut state = self.lock();
                let mut batch = Vec::new();
                let mut taken_groups: Vec<String> = Vec::new();
                let mut index = 0;

                while index < state.entries.len() && batch.len() < max_messages {
                    let entry = &state.entries[index];
                    // One in-flight message per group preserves per-user ordering
                    if entry.visible_at <= now && !taken_groups.contains(&entry.group_id) {
                        let entry = state.entries.remove(index);
                        taken_groups.push(entry.group_id.clone());
                        let delete_token = Uuid::new_v4().to_string();
                        state
                            .in_flight
                            .insert(delete_token.clone(), entry.message_id);
                        batch.push((entry.body, delete_token));
                    } else {
                        index += 1;
                    }
                }
                batch
            };

            if !batch.is_empty() || Utc::now() >= deadline {
                return Ok(batch);
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    async fn delete(&self, delete_token: &str) -> ConnectorResult<()> {
        let mut state = self.lock();
        state
            .in_flight
            .remove(delete_token)
            .map(|_| ())
            .ok_or_else(|| ConnectorError::Enqueue(format!("unknown delete token: {delete_token}")))
    }
}
