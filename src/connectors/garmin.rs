// ABOUTME: Garmin vendor hooks: optional basic-auth webhook check and push payload parsing
// ABOUTME: Garmin publishes no signature scheme; payloads group summaries by type key
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{ParsedEvent, VendorHooks};
use crate::errors::{ConnectorError, ConnectorResult};
use crate::models::Vendor;
use crate::webhooks::{verify_basic_auth, WebhookVerifier};
use base64::{engine::general_purpose, Engine};
use std::collections::HashMap;

/// Garmin webhook hooks
///
/// Garmin's push service carries no signature. Deployments that configure a
/// webhook secret of the form `user:pass` require matching HTTP Basic Auth
/// credentials on every delivery; without a secret, deliveries are accepted
/// as-is and trust rests on the endpoint URL being unguessable.
pub struct GarminHooks {
    credentials: Option<(String, String)>,
}

impl GarminHooks {
    /// Build hooks, parsing an optional `user:pass` basic-auth secret
    #[must_use]
    pub fn new(webhook_secret: Option<&str>) -> Self {
        let credentials = webhook_secret.and_then(|secret| {
            secret
                .split_once(':')
                .map(|(user, pass)| (user.to_owned(), pass.to_owned()))
        });
        Self { credentials }
    }
}

impl VendorHooks for GarminHooks {
    fn vendor(&self) -> Vendor {
        Vendor::Garmin
    }

    fn verify_webhook(
        &self,
        _verifier: Option<&WebhookVerifier>,
        headers: &HashMap<String, String>,
        _body: &[u8],
    ) -> ConnectorResult<()> {
        let Some((expected_user, expected_pass)) = self.credentials.as_ref() else {
            return Ok(());
        };

        let authorization = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| ConnectorError::Webhook("missing authorization header".into()))?;

        let encoded = authorization
            .strip_prefix("Basic ")
            .ok_or_else(|| ConnectorError::Webhook("expected basic authorization".into()))?;
        let decoded = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| ConnectorError::Webhook("malformed basic auth encoding".into()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| ConnectorError::Webhook("malformed basic auth encoding".into()))?;
        let (user, pass) = decoded
            .split_once(':')
            .ok_or_else(|| ConnectorError::Webhook("malformed basic auth credentials".into()))?;

        verify_basic_auth(user, pass, expected_user, expected_pass)
    }

    fn parse_event(&self, body: &[u8]) -> ConnectorResult<ParsedEvent> {
        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ConnectorError::Webhook(format!("invalid JSON payload: {e}")))?;

        // Push bodies look like {"dailies": [{"userId": "...", "summaryId": "..."}]}
        let (summary_type, first) = payload
            .as_object()
            .and_then(|object| {
                object.iter().find_map(|(key, value)| {
                    value
                        .as_array()
                        .and_then(|entries| entries.first())
                        .map(|entry| (key.clone(), entry))
                })
            })
            .ok_or_else(|| {
                ConnectorError::Webhook("expected a summary array in push payload".into())
            })?;

        let user_id = first
            .get("userId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ConnectorError::Webhook("missing required field: userId".into()))?
            .to_owned();
        let resource_id = first
            .get("summaryId")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);

        Ok(ParsedEvent {
            event_type: format!("{summary_type}.updated"),
            user_id,
            resource_id,
            trace_id: None,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_header(user: &str, pass: &str) -> HashMap<String, String> {
        let encoded = general_purpose::STANDARD.encode(format!("{user}:{pass}"));
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_owned(), format!("Basic {encoded}"));
        headers
    }

    #[test]
    fn no_secret_accepts_everything() {
        GarminHooks::new(None)
            .verify_webhook(None, &HashMap::new(), b"{}")
            .unwrap();
    }

    #[test]
    fn configured_secret_requires_matching_credentials() {
        let hooks = GarminHooks::new(Some("hook:pw"));
        hooks
            .verify_webhook(None, &basic_header("hook", "pw"), b"{}")
            .unwrap();
        assert!(hooks
            .verify_webhook(None, &basic_header("hook", "wrong"), b"{}")
            .is_err());
        assert!(hooks.verify_webhook(None, &HashMap::new(), b"{}").is_err());
    }

    #[test]
    fn parses_push_summaries() {
        let body = br#"{"dailies":[{"userId":"g-1","summaryId":"s-7","steps":9000}]}"#;
        let event = GarminHooks::new(None).parse_event(body).unwrap();
        assert_eq!(event.event_type, "dailies.updated");
        assert_eq!(event.user_id, "g-1");
        assert_eq!(event.resource_id.as_deref(), Some("s-7"));
    }

    #[test]
    fn empty_push_payload_is_rejected() {
        assert!(GarminHooks::new(None).parse_event(b"{}").is_err());
        assert!(GarminHooks::new(None)
            .parse_event(br#"{"dailies":[]}"#)
            .is_err());
    }
}
