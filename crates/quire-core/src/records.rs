// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent records and messages exchanged between components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    AuditAction, DeliveryId, DeliveryStatus, EventType, SubscriptionId, TenantId, UserId,
};

/// Name of the queue job that carries one delivery to the worker.
pub const DELIVER_JOB: &str = "webhook/deliver";

/// Each delivery row represents exactly one attempt; re-sends are new rows.
pub const MAX_ATTEMPTS_PER_DELIVERY: u32 = 1;

/// A tenant's registered external endpoint plus the event types it receives.
///
/// `secret_hash` is skipped during serialization so the record can be
/// returned from APIs without leaking key material.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub events: Vec<EventType>,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub last_delivery_at: Option<DateTime<Utc>>,
    pub last_delivery_status: Option<DeliveryStatus>,
    pub consecutive_failures: u32,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Whether this subscription receives the given event type.
    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.events.contains(&event_type)
    }
}

/// Partial update applied by the subscription store. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl SubscriptionPatch {
    /// True when the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.url.is_none()
            && self.events.is_none()
            && self.is_active.is_none()
    }
}

/// Validated column changes for one subscription. Only `Some` fields are
/// written; everything else, health fields included, is left as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub url: Option<String>,
    pub events: Option<Vec<EventType>>,
    pub is_active: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionChanges {
    /// Names of the fields this change set writes, in a stable order.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        [
            ("name", self.name.is_some()),
            ("description", self.description.is_some()),
            ("url", self.url.is_some()),
            ("events", self.events.is_some()),
            ("is_active", self.is_active.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, set)| set.then_some(field))
        .collect()
    }

    /// Apply the set fields to an in-memory row.
    pub fn apply_to(&self, subscription: &mut Subscription) {
        if let Some(name) = &self.name {
            subscription.name = name.clone();
        }
        if let Some(description) = &self.description {
            subscription.description = description.clone();
        }
        if let Some(url) = &self.url {
            subscription.url = url.clone();
        }
        if let Some(events) = &self.events {
            subscription.events = events.clone();
        }
        if let Some(active) = self.is_active {
            subscription.is_active = active;
        }
        subscription.updated_at = self.updated_at;
    }

    /// Whether applying these changes turns an inactive row active.
    pub fn reactivates(&self, current: &Subscription) -> bool {
        self.is_active == Some(true) && !current.is_active
    }
}

/// Result of a quota-checked subscription update.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionUpdate {
    Updated(Subscription),
    NotFound,
    /// Re-activation refused: the tenant is at its active-subscription cap.
    QuotaExceeded,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

/// One tracked attempt to deliver one event to one subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub tenant_id: TenantId,
    pub subscription_id: SubscriptionId,
    pub event_id: String,
    pub event_type: EventType,
    /// The exact JSON body sent to the subscriber.
    pub payload: String,
    pub status: DeliveryStatus,
    pub response_status_code: Option<u16>,
    pub error_message: Option<String>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub duration_ms: Option<u64>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// The failed delivery this row re-sends, if it was created by a retry.
    pub retry_of: Option<DeliveryId>,
}

impl Delivery {
    /// A fresh `pending` delivery with a new id.
    pub fn pending(
        tenant_id: TenantId,
        subscription_id: SubscriptionId,
        event_id: String,
        event_type: EventType,
        payload: String,
    ) -> Self {
        Self {
            id: DeliveryId::generate(),
            tenant_id,
            subscription_id,
            event_id,
            event_type,
            payload,
            status: DeliveryStatus::Pending,
            response_status_code: None,
            error_message: None,
            attempt_count: 0,
            max_attempts: MAX_ATTEMPTS_PER_DELIVERY,
            duration_ms: None,
            delivered_at: None,
            created_at: Utc::now(),
            retry_of: None,
        }
    }
}

/// Terminal result written by the worker attempt that owns a delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    pub response_status_code: Option<u16>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl DeliveryOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }

    /// A `failed` outcome for a delivery that never reached the subscriber,
    /// such as one whose job could not be queued.
    pub fn unsent(error_message: String) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            response_status_code: None,
            error_message: Some(error_message),
            duration_ms: 0,
            completed_at: Utc::now(),
        }
    }
}

/// Filter for delivery history queries. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct DeliveryFilter {
    pub subscription_id: Option<SubscriptionId>,
    pub event_id: Option<String>,
    pub status: Option<DeliveryStatus>,
    /// Maximum rows returned, newest first. `None` means no limit.
    pub limit: Option<usize>,
}

impl DeliveryFilter {
    pub fn matches(&self, delivery: &Delivery) -> bool {
        self.subscription_id
            .as_ref()
            .is_none_or(|id| *id == delivery.subscription_id)
            && self
                .event_id
                .as_ref()
                .is_none_or(|id| *id == delivery.event_id)
            && self.status.is_none_or(|s| s == delivery.status)
    }
}

/// A business event emitted by the ERP, before fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub tenant_id: TenantId,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    /// A new event with a random id, stamped now.
    pub fn new(tenant_id: TenantId, event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            tenant_id,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Payload of a `webhook/deliver` queue job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    pub delivery_id: DeliveryId,
    pub subscription_id: SubscriptionId,
    pub tenant_id: TenantId,
    pub url: String,
    pub payload: String,
    pub event_id: String,
    pub event_type: EventType,
}

impl DeliveryJob {
    /// Build the job for a delivery row addressed to `url`.
    pub fn for_delivery(delivery: &Delivery, url: &str) -> Self {
        Self {
            delivery_id: delivery.id.clone(),
            subscription_id: delivery.subscription_id.clone(),
            tenant_id: delivery.tenant_id.clone(),
            url: url.to_string(),
            payload: delivery.payload.clone(),
            event_id: delivery.event_id.clone(),
            event_type: delivery.event_type,
        }
    }
}

/// One write to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        action: AuditAction,
        resource_type: &str,
        resource_id: &str,
        details: serde_json::Value,
    ) -> Self {
        Self {
            tenant_id,
            user_id,
            action,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details,
            created_at: Utc::now(),
        }
    }
}
