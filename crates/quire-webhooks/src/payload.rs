// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound request bodies.
//!
//! Every body is the envelope `{"id", "type", "created_at", "data"}`. The
//! string produced here is stored verbatim on the delivery row and signed
//! byte for byte, so it is serialized exactly once per event.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;

use quire_core::{DomainEvent, QuireError, Subscription, TEST_EVENT_TYPE};

/// Text carried in the `data.message` field of probe requests.
pub const TEST_MESSAGE: &str = "This is a test webhook delivery from Quire";

#[derive(Serialize)]
struct Envelope<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    created_at: String,
    data: &'a serde_json::Value,
}

fn render(
    id: &str,
    event_type: &str,
    created_at: DateTime<Utc>,
    data: &serde_json::Value,
) -> Result<String, QuireError> {
    let envelope = Envelope {
        id,
        event_type,
        created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        data,
    };
    serde_json::to_string(&envelope)
        .map_err(|e| QuireError::Internal(format!("failed to encode webhook payload: {e}")))
}

/// The body fanned out for a domain event.
pub fn event_payload(event: &DomainEvent) -> Result<String, QuireError> {
    render(
        &event.id,
        event.event_type.as_str(),
        event.timestamp,
        &event.data,
    )
}

/// The synthetic body sent by the test probe.
pub fn test_payload(subscription: &Subscription) -> Result<String, QuireError> {
    let id = uuid::Uuid::new_v4().to_string();
    let data = json!({
        "message": TEST_MESSAGE,
        "subscription_id": subscription.id,
        "subscription_name": subscription.name,
    });
    render(&id, TEST_EVENT_TYPE, Utc::now(), &data)
}
