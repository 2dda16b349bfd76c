// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event fan-out.
//!
//! For one domain event the dispatcher writes a `pending` delivery row and
//! enqueues one `webhook/deliver` job per matching active subscription. It
//! never fails its caller: every error is logged, and a failure for one
//! subscription does not stop the others.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use quire_core::{
    Delivery, DeliveryJob, DeliveryOutcome, DeliveryRepository, DomainEvent, JobQueue, QuireError,
    Subscription, SubscriptionRepository,
};

use crate::payload::event_payload;

/// Fans domain events out to subscribers.
#[derive(Clone)]
pub struct Dispatcher {
    subscriptions: Arc<dyn SubscriptionRepository>,
    deliveries: Arc<dyn DeliveryRepository>,
    queue: Arc<dyn JobQueue>,
}

impl Dispatcher {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        deliveries: Arc<dyn DeliveryRepository>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            queue,
        }
    }

    /// Fan `event` out and return how many active subscriptions matched it.
    ///
    /// The count includes subscriptions whose row or job could not be
    /// written; those failures are logged.
    pub async fn dispatch(&self, event: &DomainEvent) -> usize {
        let active = match self
            .subscriptions
            .list_active_subscriptions(&event.tenant_id)
            .await
        {
            Ok(active) => active,
            Err(e) => {
                error!(
                    tenant_id = %event.tenant_id,
                    event_id = %event.id,
                    error = %e,
                    "failed to load subscriptions for dispatch"
                );
                return 0;
            }
        };

        let matching: Vec<Subscription> = active
            .into_iter()
            .filter(|s| s.subscribes_to(event.event_type))
            .collect();
        if matching.is_empty() {
            debug!(
                tenant_id = %event.tenant_id,
                event_id = %event.id,
                event_type = %event.event_type,
                "no subscriptions for event"
            );
            return 0;
        }

        let payload = match event_payload(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "failed to encode event payload");
                return 0;
            }
        };

        let mut queued = 0usize;
        for subscription in &matching {
            match self.fan_out_one(event, subscription, &payload).await {
                Ok(()) => queued += 1,
                Err(e) => warn!(
                    tenant_id = %event.tenant_id,
                    subscription_id = %subscription.id,
                    event_id = %event.id,
                    error = %e,
                    "failed to queue delivery, continuing with remaining subscriptions"
                ),
            }
        }

        info!(
            tenant_id = %event.tenant_id,
            event_id = %event.id,
            event_type = %event.event_type,
            matched = matching.len(),
            queued,
            "event dispatched"
        );
        matching.len()
    }

    /// Run [`dispatch`](Self::dispatch) on a background task.
    pub fn spawn_dispatch(&self, event: DomainEvent) -> JoinHandle<usize> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.dispatch(&event).await })
    }

    async fn fan_out_one(
        &self,
        event: &DomainEvent,
        subscription: &Subscription,
        payload: &str,
    ) -> Result<(), QuireError> {
        let delivery = Delivery::pending(
            event.tenant_id.clone(),
            subscription.id.clone(),
            event.id.clone(),
            event.event_type,
            payload.to_string(),
        );
        self.deliveries.insert_delivery(&delivery).await?;
        let job = DeliveryJob::for_delivery(&delivery, &subscription.url);
        if let Err(e) = self.queue.enqueue(&job).await {
            settle_unqueued(self.deliveries.as_ref(), &delivery, &e).await;
            return Err(e);
        }
        debug!(
            delivery_id = %delivery.id,
            subscription_id = %subscription.id,
            "delivery queued"
        );
        Ok(())
    }
}

/// Mark a row whose job never reached the queue as `failed`, so it shows up
/// in history as retryable instead of staying `pending`.
pub(crate) async fn settle_unqueued(
    deliveries: &dyn DeliveryRepository,
    delivery: &Delivery,
    cause: &QuireError,
) {
    let outcome = DeliveryOutcome::unsent(format!("Failed to enqueue delivery: {cause}"));
    if let Err(e) = deliveries
        .complete_delivery(&delivery.tenant_id, &delivery.id, &outcome)
        .await
    {
        error!(
            delivery_id = %delivery.id,
            error = %e,
            "failed to settle unqueued delivery, row stays pending"
        );
    }
}
