// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifiers and enumerations shared across the Quire workspace.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of the tenant (publishing house) that owns a record.
    TenantId
);

string_id!(
    /// Identifier of the user acting on a record.
    UserId
);

string_id!(
    /// Unique identifier of a webhook subscription.
    SubscriptionId
);

string_id!(
    /// Unique identifier of a delivery attempt record.
    DeliveryId
);

impl SubscriptionId {
    /// Generate a fresh random (UUID v4) subscription id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl DeliveryId {
    /// Generate a fresh random (UUID v4) delivery id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// The platform's fixed enumeration of subscribable domain events.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum EventType {
    #[strum(serialize = "title.created")]
    #[serde(rename = "title.created")]
    TitleCreated,
    #[strum(serialize = "title.updated")]
    #[serde(rename = "title.updated")]
    TitleUpdated,
    #[strum(serialize = "title.deleted")]
    #[serde(rename = "title.deleted")]
    TitleDeleted,
    #[strum(serialize = "contact.created")]
    #[serde(rename = "contact.created")]
    ContactCreated,
    #[strum(serialize = "contact.updated")]
    #[serde(rename = "contact.updated")]
    ContactUpdated,
    #[strum(serialize = "sale.created")]
    #[serde(rename = "sale.created")]
    SaleCreated,
    #[strum(serialize = "sale.updated")]
    #[serde(rename = "sale.updated")]
    SaleUpdated,
    #[strum(serialize = "return.created")]
    #[serde(rename = "return.created")]
    ReturnCreated,
    #[strum(serialize = "return.approved")]
    #[serde(rename = "return.approved")]
    ReturnApproved,
    #[strum(serialize = "isbn.assigned")]
    #[serde(rename = "isbn.assigned")]
    IsbnAssigned,
    #[strum(serialize = "onix.exported")]
    #[serde(rename = "onix.exported")]
    OnixExported,
}

impl EventType {
    /// Wire name of the event type (e.g. `title.created`).
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Every subscribable event type, in declaration order.
    pub fn all() -> Vec<EventType> {
        use strum::IntoEnumIterator;
        EventType::iter().collect()
    }
}

/// Wire type used by test-probe payloads. Never subscribable.
pub const TEST_EVENT_TYPE: &str = "test";

/// Lifecycle status of a delivery record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    /// True once a worker attempt has written its outcome.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Actions recorded in the audit log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Retry,
}

/// Permissions checked by the management API.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum Permission {
    /// Read subscriptions and delivery history.
    #[strum(serialize = "webhooks:read")]
    #[serde(rename = "webhooks:read")]
    WebhooksRead,
    /// Create, modify, delete, probe subscriptions and retry deliveries.
    #[strum(serialize = "webhooks:manage")]
    #[serde(rename = "webhooks:manage")]
    WebhooksManage,
}

/// Health status reported by storage and service health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Not operational.
    Unhealthy(String),
}
