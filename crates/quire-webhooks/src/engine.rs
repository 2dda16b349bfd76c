// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembles the webhook components from configuration and collaborators.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tracing::debug;

use quire_config::model::QuireConfig;
use quire_core::{
    AuditSink, Delivery, DeliveryFilter, DeliveryId, DeliveryRepository, JobQueue, JobSource,
    QuireError, SubscriptionRepository, TenantId,
};
use quire_security::{KeyDeriver, build_delivery_client};

use crate::dispatcher::Dispatcher;
use crate::pool::WorkerPool;
use crate::probe::TestProbe;
use crate::retry::RetryCoordinator;
use crate::store::SubscriptionStore;
use crate::worker::DeliveryWorker;

/// The persistence, queue, and audit dependencies of the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub deliveries: Arc<dyn DeliveryRepository>,
    pub queue: Arc<dyn JobQueue>,
    pub audit: Arc<dyn AuditSink>,
}

impl Collaborators {
    /// Use one backend for every collaborator.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: SubscriptionRepository + DeliveryRepository + JobQueue + AuditSink + 'static,
    {
        Self {
            subscriptions: backend.clone(),
            deliveries: backend.clone(),
            queue: backend.clone(),
            audit: backend,
        }
    }
}

/// Every webhook component, wired to the same collaborators.
pub struct WebhookEngine {
    pub store: SubscriptionStore,
    pub dispatcher: Dispatcher,
    pub retry: RetryCoordinator,
    pub probe: TestProbe,
    worker: Arc<DeliveryWorker>,
    deliveries: Arc<dyn DeliveryRepository>,
    concurrency: usize,
    poll_interval: Duration,
}

impl WebhookEngine {
    /// Build the engine. Fails when the signing master key is missing or too
    /// short, or when the delivery client cannot be built.
    pub fn new(collaborators: Collaborators, config: &QuireConfig) -> Result<Self, QuireError> {
        let webhooks = &config.webhooks;
        let master_key = webhooks.signing_master_key.clone().ok_or_else(|| {
            QuireError::Config(
                "webhooks.signing_master_key is required (set QUIRE_WEBHOOKS_SIGNING_MASTER_KEY)"
                    .into(),
            )
        })?;
        let keys = KeyDeriver::new(&SecretString::from(master_key))?;
        let client = build_delivery_client(&config.security, webhooks)?;
        let timeout = Duration::from_secs(webhooks.delivery_timeout_secs);

        let Collaborators {
            subscriptions,
            deliveries,
            queue,
            audit,
        } = collaborators;

        let worker = Arc::new(DeliveryWorker::new(
            subscriptions.clone(),
            deliveries.clone(),
            client.clone(),
            keys,
            timeout,
        ));

        debug!(
            max_subscriptions = webhooks.max_subscriptions_per_tenant,
            timeout_secs = webhooks.delivery_timeout_secs,
            "webhook engine assembled"
        );

        Ok(Self {
            store: SubscriptionStore::new(subscriptions.clone(), audit.clone(), webhooks),
            dispatcher: Dispatcher::new(subscriptions.clone(), deliveries.clone(), queue.clone()),
            retry: RetryCoordinator::new(subscriptions.clone(), deliveries.clone(), queue, audit),
            probe: TestProbe::new(subscriptions, client, timeout),
            worker,
            deliveries,
            concurrency: webhooks.worker_concurrency,
            poll_interval: Duration::from_millis(webhooks.poll_interval_ms),
        })
    }

    /// A worker pool consuming `source` with the configured size and poll
    /// interval.
    pub fn worker_pool(&self, source: Arc<dyn JobSource>) -> WorkerPool {
        WorkerPool::new(
            self.worker.clone(),
            source,
            self.concurrency,
            self.poll_interval,
        )
    }

    /// Delivery history for a tenant, newest first.
    pub async fn deliveries(
        &self,
        tenant_id: &TenantId,
        filter: &DeliveryFilter,
    ) -> Result<Vec<Delivery>, QuireError> {
        self.deliveries.list_deliveries(tenant_id, filter).await
    }

    pub async fn delivery(
        &self,
        tenant_id: &TenantId,
        id: &DeliveryId,
    ) -> Result<Option<Delivery>, QuireError> {
        self.deliveries.get_delivery(tenant_id, id).await
    }
}
