// ABOUTME: WHOOP vendor hooks: timestamped HMAC webhook verification and v2 payload parsing
// ABOUTME: Headers X-WHOOP-Signature and X-WHOOP-Signature-Timestamp carry the proof
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{ParsedEvent, VendorHooks};
use crate::errors::{ConnectorError, ConnectorResult};
use crate::models::Vendor;
use crate::webhooks::{extract_signature_headers, WebhookVerifier};
use std::collections::HashMap;

const SIGNATURE_HEADER: &str = "X-WHOOP-Signature";
const TIMESTAMP_HEADER: &str = "X-WHOOP-Signature-Timestamp";

/// WHOOP webhook hooks
///
/// WHOOP v2 webhooks sign `"{timestamp}.{body}"` with HMAC-SHA256 and ship
/// a compact JSON body carrying `user_id`, `type`, `id`, and `trace_id`.
pub struct WhoopHooks;

impl VendorHooks for WhoopHooks {
    fn vendor(&self) -> Vendor {
        Vendor::Whoop
    }

    fn verify_webhook(
        &self,
        verifier: Option<&WebhookVerifier>,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> ConnectorResult<()> {
        let Some(verifier) = verifier else {
            return Err(ConnectorError::Webhook(
                "whoop webhook secret not configured".into(),
            ));
        };

        let (signature, timestamp) =
            extract_signature_headers(headers, SIGNATURE_HEADER, TIMESTAMP_HEADER);
        let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
            return Err(ConnectorError::Webhook(
                "missing signature or timestamp header".into(),
            ));
        };

        verifier.verify_hmac_sha256(&timestamp, body, &signature)
    }

    fn parse_event(&self, body: &[u8]) -> ConnectorResult<ParsedEvent> {
        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ConnectorError::Webhook(format!("invalid JSON payload: {e}")))?;

        let event_type = payload
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ConnectorError::Webhook("missing required field: type".into()))?
            .to_owned();

        // v2 payloads carry numeric user ids; normalize to string
        let user_id = match payload.get("user_id") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return Err(ConnectorError::Webhook("missing required field: user_id".into())),
        };

        let resource_id = payload
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        let trace_id = payload
            .get("trace_id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);

        Ok(ParsedEvent {
            event_type,
            user_id,
            resource_id,
            trace_id,
            payload,
        })
    }
}
