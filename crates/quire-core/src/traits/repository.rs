// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant-scoped repositories for subscriptions and deliveries.
//!
//! Every read and write takes the owning tenant, so no implementation can
//! return or mutate another tenant's rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::QuireError;
use crate::records::{
    Delivery, DeliveryFilter, DeliveryOutcome, Subscription, SubscriptionChanges,
    SubscriptionUpdate,
};
use crate::types::{DeliveryId, DeliveryStatus, SubscriptionId, TenantId};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a new subscription unless it is active and the tenant already
    /// has `max_active` active subscriptions. The count and the insert are
    /// one atomic step.
    ///
    /// Returns false when the cap refused the insert.
    async fn insert_subscription(
        &self,
        subscription: &Subscription,
        max_active: usize,
    ) -> Result<bool, QuireError>;

    async fn get_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, QuireError>;

    /// All subscriptions of a tenant, newest first.
    async fn list_subscriptions(&self, tenant_id: &TenantId)
    -> Result<Vec<Subscription>, QuireError>;

    async fn list_active_subscriptions(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Subscription>, QuireError>;

    /// Write only the columns set in `changes` and return the row as stored
    /// afterwards. Concurrent updates of different fields both survive.
    ///
    /// Re-activating an inactive row is refused when the tenant already has
    /// `max_active` active subscriptions; the check and the write are one
    /// atomic step.
    async fn update_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        changes: &SubscriptionChanges,
        max_active: usize,
    ) -> Result<SubscriptionUpdate, QuireError>;

    async fn set_secret_hash(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        secret_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, QuireError>;

    async fn delete_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<bool, QuireError>;

    /// Update delivery health: increment `consecutive_failures` on failure,
    /// reset it to zero on success.
    async fn record_delivery_result(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<(), QuireError>;
}

#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    async fn insert_delivery(&self, delivery: &Delivery) -> Result<(), QuireError>;

    /// Insert a row created by a retry, unless its `retry_of` delivery has
    /// already been retried. The check and the insert are one atomic step.
    ///
    /// Returns false when an earlier retry row exists.
    async fn insert_retry(&self, delivery: &Delivery) -> Result<bool, QuireError>;

    async fn get_delivery(
        &self,
        tenant_id: &TenantId,
        id: &DeliveryId,
    ) -> Result<Option<Delivery>, QuireError>;

    /// Deliveries matching `filter`, newest first.
    async fn list_deliveries(
        &self,
        tenant_id: &TenantId,
        filter: &DeliveryFilter,
    ) -> Result<Vec<Delivery>, QuireError>;

    /// Move a `pending` delivery to its terminal outcome and bump its
    /// attempt count.
    ///
    /// Returns false when the row is missing or no longer pending, so a
    /// duplicate job can never overwrite a recorded outcome.
    async fn complete_delivery(
        &self,
        tenant_id: &TenantId,
        id: &DeliveryId,
        outcome: &DeliveryOutcome,
    ) -> Result<bool, QuireError>;
}
