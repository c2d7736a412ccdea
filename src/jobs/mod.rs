// ABOUTME: Job queue with idempotent enqueue and exponential-backoff requeue
// ABOUTME: Trace IDs dedup duplicate deliveries; retry budget caps at five attempts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Job Queue
//!
//! Queues verified webhook events for downstream processing. Every message
//! carries its event's `trace_id` as the dedup key and `vendor:user_id` as
//! the ordering group, so duplicate deliveries collapse to one logical job
//! and one user's events process in submission order. No ordering holds
//! across different users.
//!
//! Failed messages requeue with exponential backoff (60 s doubling to a
//! 900 s ceiling); after five retries the message is permanently failed,
//! loudly, never dropped in silence.

pub mod queue;

pub use queue::{MemoryQueue, QueuePort};

use crate::constants::retries;
use crate::errors::{ConnectorError, ConnectorResult};
use crate::models::{QueueMessage, Vendor, WebhookEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A message pulled off the queue along with its acknowledgement token
#[derive(Debug)]
pub struct ReceivedMessage {
    pub message: QueueMessage,
    pub delete_token: String,
}

/// Job enqueueing and retry management over a queue port
pub struct JobQueue {
    port: Arc<dyn QueuePort>,
    max_retries: u32,
}

impl JobQueue {
    /// Create a job queue with the default retry budget
    pub fn new(port: Arc<dyn QueuePort>) -> Self {
        Self {
            port,
            max_retries: retries::MAX_RETRIES,
        }
    }

    /// Enqueue a verified webhook event
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Enqueue`] on queue backend failure
    pub async fn enqueue(&self, event: WebhookEvent, delay_secs: u64) -> ConnectorResult<String> {
        let message = QueueMessage::from_event(event);
        let dedup_id = message.trace_id.clone();
        self.send(&message, &dedup_id, delay_secs).await
    }

    /// Enqueue a backfill job covering a date range
    ///
    /// Backfills are synthesized events with a fresh trace id; two backfill
    /// requests are never dedup'd against each other.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Enqueue`] on queue backend failure
    pub async fn enqueue_backfill(
        &self,
        vendor: Vendor,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConnectorResult<String> {
        let message = QueueMessage {
            vendor,
            event_type: "backfill.requested".to_owned(),
            user_id: user_id.to_owned(),
            resource_id: None,
            trace_id: Uuid::new_v4().to_string(),
            received_at: Utc::now(),
            retries: 0,
            payload: serde_json::json!({
                "start_date": start.to_rfc3339(),
                "end_date": end.to_rfc3339(),
            }),
        };
        let dedup_id = message.trace_id.clone();
        self.send(&message, &dedup_id, 0).await
    }

    /// Requeue a failed message with exponential backoff
    ///
    /// Deletion of the original is best effort: a failed delete is logged
    /// and the resend proceeds, because at-least-once delivery is
    /// acceptable when the dedup key absorbs duplicates downstream.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Enqueue`] when the retry budget is
    /// exhausted (nothing is sent) or the resend itself fails
    pub async fn requeue_with_backoff(
        &self,
        mut message: QueueMessage,
        delete_token: &str,
    ) -> ConnectorResult<String> {
        message.retries += 1;

        if message.retries > self.max_retries {
            return Err(ConnectorError::Enqueue(format!(
                "message {} exceeded max retries ({})",
                message.trace_id, self.max_retries
            )));
        }

        let delay_secs = backoff_delay_secs(message.retries);

        if let Err(err) = self.port.delete(delete_token).await {
            warn!(
                trace_id = %message.trace_id,
                error = %err,
                "Failed to delete original message before requeue"
            );
        }

        debug!(
            trace_id = %message.trace_id,
            retries = message.retries,
            delay_secs,
            "Requeueing message with backoff"
        );
        // Scope the dedup key by attempt so the resend survives the queue's
        // dedup window; the trace id alone would collapse it into the
        // original delivery.
        let dedup_id = format!("{}#r{}", message.trace_id, message.retries);
        self.send(&message, &dedup_id, delay_secs).await
    }

    /// Receive messages, long-polling up to `wait_secs`
    ///
    /// Bodies that fail to parse are logged and skipped rather than
    /// poisoning the batch.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Enqueue`] on queue backend failure
    pub async fn receive(
        &self,
        max_messages: usize,
        wait_secs: u64,
    ) -> ConnectorResult<Vec<ReceivedMessage>> {
        let raw = self.port.receive(max_messages, wait_secs).await?;

        let mut received = Vec::with_capacity(raw.len());
        for (body, delete_token) in raw {
            match serde_json::from_str::<QueueMessage>(&body) {
                Ok(message) => received.push(ReceivedMessage {
                    message,
                    delete_token,
                }),
                Err(err) => warn!(error = %err, "Skipping unparseable queue message"),
            }
        }
        Ok(received)
    }

    /// Acknowledge a successfully processed message
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Enqueue`] on queue backend failure
    pub async fn delete(&self, delete_token: &str) -> ConnectorResult<()> {
        self.port.delete(delete_token).await
    }

    async fn send(
        &self,
        message: &QueueMessage,
        dedup_id: &str,
        delay_secs: u64,
    ) -> ConnectorResult<String> {
        let body = serde_json::to_string(message)
            .map_err(|e| ConnectorError::Enqueue(format!("failed to serialize message: {e}")))?;
        self.port
            .send(body, dedup_id, &message.group_id(), delay_secs)
            .await
    }
}

/// Backoff delay for the nth retry: 60 s doubling, capped at 900 s
#[must_use]
pub fn backoff_delay_secs(retry: u32) -> u64 {
    let exponent = retry.saturating_sub(1).min(63);
    retries::BACKOFF_BASE_SECS
        .saturating_mul(1u64 << exponent)
        .min(retries::BACKOFF_CAP_SECS)
}
