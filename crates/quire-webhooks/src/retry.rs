// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manual retry of failed deliveries.
//!
//! A retry never touches the failed row. It inserts a new `pending` row that
//! points back at the original through `retry_of`, so the history of one
//! event/subscription pair stays append-only. Each failed row can be
//! retried once; later attempts chain off the newest retry row.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use quire_core::{
    AuditAction, AuditEntry, AuditSink, Delivery, DeliveryId, DeliveryJob, DeliveryRepository,
    DeliveryStatus, JobQueue, QuireError, SubscriptionRepository, TenantId, UserId,
};

use crate::dispatcher::settle_unqueued;

/// Audit `resource_type` for retries.
pub const DELIVERY_RESOURCE: &str = "webhook_delivery";

pub struct RetryCoordinator {
    subscriptions: Arc<dyn SubscriptionRepository>,
    deliveries: Arc<dyn DeliveryRepository>,
    queue: Arc<dyn JobQueue>,
    audit: Arc<dyn AuditSink>,
}

impl RetryCoordinator {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        deliveries: Arc<dyn DeliveryRepository>,
        queue: Arc<dyn JobQueue>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            queue,
            audit,
        }
    }

    /// Re-send a failed delivery as a new row and job. Returns the new row.
    pub async fn retry(
        &self,
        delivery_id: &DeliveryId,
        tenant_id: &TenantId,
        acting_user: &UserId,
    ) -> Result<Delivery, QuireError> {
        let original = self
            .deliveries
            .get_delivery(tenant_id, delivery_id)
            .await?
            .ok_or_else(|| QuireError::NotFound("Delivery not found".into()))?;
        if original.status != DeliveryStatus::Failed {
            return Err(QuireError::Validation(
                "Can only retry failed deliveries".into(),
            ));
        }

        let subscription = self
            .subscriptions
            .get_subscription(tenant_id, &original.subscription_id)
            .await?
            .ok_or_else(|| QuireError::NotFound("Subscription not found".into()))?;
        if !subscription.is_active {
            return Err(QuireError::Validation("Subscription is disabled".into()));
        }

        let mut retry = Delivery::pending(
            original.tenant_id.clone(),
            original.subscription_id.clone(),
            original.event_id.clone(),
            original.event_type,
            original.payload.clone(),
        );
        retry.retry_of = Some(original.id.clone());

        if !self.deliveries.insert_retry(&retry).await? {
            return Err(QuireError::Validation(
                "Delivery has already been retried".into(),
            ));
        }
        let job = DeliveryJob::for_delivery(&retry, &subscription.url);
        if let Err(e) = self.queue.enqueue(&job).await {
            warn!(new_delivery_id = %retry.id, error = %e, "failed to queue retry");
            settle_unqueued(self.deliveries.as_ref(), &retry, &e).await;
            return Err(e);
        }

        info!(
            tenant_id = %tenant_id,
            original_delivery_id = %original.id,
            new_delivery_id = %retry.id,
            subscription_id = %subscription.id,
            "delivery retry queued"
        );

        let entry = AuditEntry::new(
            tenant_id.clone(),
            acting_user.clone(),
            AuditAction::Retry,
            DELIVERY_RESOURCE,
            retry.id.as_str(),
            json!({
                "original_delivery_id": original.id,
                "new_delivery_id": retry.id,
            }),
        );
        if let Err(e) = self.audit.record(&entry).await {
            warn!(new_delivery_id = %retry.id, error = %e, "failed to write audit entry");
        }

        Ok(retry)
    }
}
