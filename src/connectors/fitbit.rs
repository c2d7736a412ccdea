// ABOUTME: Fitbit vendor hooks: body-hash webhook verification and notification parsing
// ABOUTME: X-Fitbit-Signature signs the raw body; payloads are notification arrays
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{ParsedEvent, VendorHooks};
use crate::errors::{ConnectorError, ConnectorResult};
use crate::models::Vendor;
use crate::webhooks::{extract_signature_headers, WebhookVerifier};
use std::collections::HashMap;

const SIGNATURE_HEADER: &str = "X-Fitbit-Signature";

/// Fitbit webhook hooks
///
/// Fitbit signs the raw body alone, with no timestamp, and delivers a JSON
/// array of subscription notifications per request. The first notification
/// drives the event fields; the full array rides along in the payload.
pub struct FitbitHooks;

impl VendorHooks for FitbitHooks {
    fn vendor(&self) -> Vendor {
        Vendor::Fitbit
    }

    fn verify_webhook(
        &self,
        verifier: Option<&WebhookVerifier>,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> ConnectorResult<()> {
        let Some(verifier) = verifier else {
            return Err(ConnectorError::Webhook(
                "fitbit webhook secret not configured".into(),
            ));
        };

        let (signature, _) = extract_signature_headers(headers, SIGNATURE_HEADER, "");
        let Some(signature) = signature else {
            return Err(ConnectorError::Webhook("missing signature header".into()));
        };

        verifier.verify_sha256_hash(body, &signature)
    }

    fn parse_event(&self, body: &[u8]) -> ConnectorResult<ParsedEvent> {
        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ConnectorError::Webhook(format!("invalid JSON payload: {e}")))?;

        let first = payload
            .as_array()
            .and_then(|notifications| notifications.first())
            .ok_or_else(|| {
                ConnectorError::Webhook("expected a non-empty notification array".into())
            })?;

        let collection = first
            .get("collectionType")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                ConnectorError::Webhook("missing required field: collectionType".into())
            })?;
        let user_id = first
            .get("ownerId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ConnectorError::Webhook("missing required field: ownerId".into()))?
            .to_owned();
        let resource_id = first
            .get("date")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);

        Ok(ParsedEvent {
            event_type: format!("{collection}.updated"),
            user_id,
            resource_id,
            trace_id: None,
            payload,
        })
    }
}
