// ABOUTME: Integration tests for incremental sync cursor management
// ABOUTME: Covers cursor accumulation, resets, vendor-filtered listing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

mod common;

use common::init_test_logging;
use std::sync::Arc;
use wearsync_connector::models::Vendor;
use wearsync_connector::sync_state::{MemoryCursorStore, SyncState};

fn sync_state() -> SyncState {
    init_test_logging();
    SyncState::new(Arc::new(MemoryCursorStore::new()))
}

#[tokio::test]
async fn first_update_creates_the_cursor() {
    let state = sync_state();
    assert!(!state.has_synced_before(Vendor::Whoop, "u1").await.unwrap());

    let cursor = state
        .update_cursor(Vendor::Whoop, "u1", "2025-06-01T00:00:00Z", 40, None)
        .await
        .unwrap();

    assert_eq!(cursor.records_synced, 40);
    assert_eq!(cursor.created_at, cursor.updated_at);
    assert!(state.has_synced_before(Vendor::Whoop, "u1").await.unwrap());
    assert_eq!(
        state
            .last_sync_timestamp(Vendor::Whoop, "u1")
            .await
            .unwrap()
            .as_deref(),
        Some("2025-06-01T00:00:00Z")
    );
}

#[tokio::test]
async fn updates_accumulate_records_and_preserve_creation_time() {
    let state = sync_state();
    let first = state
        .update_cursor(Vendor::Fitbit, "u1", "2025-06-01T00:00:00Z", 10, None)
        .await
        .unwrap();
    let second = state
        .update_cursor(
            Vendor::Fitbit,
            "u1",
            "2025-06-02T00:00:00Z",
            5,
            Some("log-99".into()),
        )
        .await
        .unwrap();

    assert_eq!(second.records_synced, 15);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.last_sync_ts, "2025-06-02T00:00:00Z");
    assert_eq!(second.last_resource_id.as_deref(), Some("log-99"));
}

#[tokio::test]
async fn malformed_timestamp_is_rejected() {
    let state = sync_state();
    assert!(state
        .update_cursor(Vendor::Whoop, "u1", "yesterday", 1, None)
        .await
        .is_err());
}

#[tokio::test]
async fn reset_forces_the_next_pull_to_full_sync() {
    let state = sync_state();
    state
        .update_cursor(Vendor::Garmin, "u1", "2025-06-01T00:00:00Z", 100, None)
        .await
        .unwrap();

    state.reset_cursor(Vendor::Garmin, "u1").await.unwrap();

    assert!(state.get_cursor(Vendor::Garmin, "u1").await.unwrap().is_none());
    assert!(!state.has_synced_before(Vendor::Garmin, "u1").await.unwrap());
}

#[tokio::test]
async fn listing_filters_by_vendor() {
    let state = sync_state();
    state
        .update_cursor(Vendor::Whoop, "u1", "2025-06-01T00:00:00Z", 1, None)
        .await
        .unwrap();
    state
        .update_cursor(Vendor::Whoop, "u2", "2025-06-01T00:00:00Z", 1, None)
        .await
        .unwrap();
    state
        .update_cursor(Vendor::Garmin, "u3", "2025-06-01T00:00:00Z", 1, None)
        .await
        .unwrap();

    assert_eq!(state.list_cursors(None).await.unwrap().len(), 3);
    assert_eq!(
        state.list_cursors(Some(Vendor::Whoop)).await.unwrap().len(),
        2
    );
    assert!(state
        .list_cursors(Some(Vendor::Fitbit))
        .await
        .unwrap()
        .is_empty());
}
