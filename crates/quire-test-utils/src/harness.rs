// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TestHarness builder for end-to-end engine testing.
//!
//! Provides a builder pattern that assembles the whole webhook engine over
//! in-memory collaborators with sensible test defaults, so integration tests
//! can create subscriptions, emit events, drain the queue, and inspect rows.

use std::sync::Arc;

use quire_config::model::QuireConfig;
use quire_core::{Delivery, DomainEvent, EventType, QuireError, TenantId, UserId};
use quire_webhooks::{Collaborators, CreatedSubscription, NewSubscription, WebhookEngine, WorkerPool};

use crate::memory::MemoryStore;
use crate::queue::MemoryQueue;

/// Master key used by harness-built engines.
pub const TEST_MASTER_KEY: &str = "quire-test-harness-master-key-0123456789";

/// Builder for constructing a [`TestHarness`] with custom configuration.
pub struct TestHarnessBuilder {
    max_subscriptions: usize,
    delivery_timeout_secs: u64,
    allow_insecure_urls: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            max_subscriptions: 10,
            delivery_timeout_secs: 5,
            allow_insecure_urls: false,
        }
    }

    /// Set the per-tenant cap on active subscriptions.
    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }

    /// Set the per-attempt delivery deadline.
    pub fn with_delivery_timeout_secs(mut self, secs: u64) -> Self {
        self.delivery_timeout_secs = secs;
        self
    }

    /// Accept plain-http subscriber URLs on any host.
    pub fn with_insecure_urls(mut self) -> Self {
        self.allow_insecure_urls = true;
        self
    }

    /// Build the test harness, creating all required components.
    pub fn build(self) -> Result<TestHarness, QuireError> {
        let mut config = QuireConfig::default();
        config.webhooks.signing_master_key = Some(TEST_MASTER_KEY.to_string());
        config.webhooks.max_subscriptions_per_tenant = self.max_subscriptions;
        config.webhooks.delivery_timeout_secs = self.delivery_timeout_secs;
        config.webhooks.allow_insecure_urls = self.allow_insecure_urls;
        config.webhooks.worker_concurrency = 2;
        config.webhooks.poll_interval_ms = 10;

        let memory = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let collaborators = Collaborators {
            subscriptions: memory.clone(),
            deliveries: memory.clone(),
            queue: queue.clone(),
            audit: memory.clone(),
        };
        let engine = Arc::new(WebhookEngine::new(collaborators, &config)?);
        let pool = engine.worker_pool(queue.clone());

        Ok(TestHarness {
            engine,
            memory,
            queue,
            pool,
            config,
        })
    }
}

/// A complete webhook engine over in-memory collaborators.
pub struct TestHarness {
    /// The assembled engine.
    pub engine: Arc<WebhookEngine>,
    /// Subscription, delivery, and audit rows.
    pub memory: Arc<MemoryStore>,
    /// The `webhook/deliver` queue.
    pub queue: Arc<MemoryQueue>,
    /// Worker pool consuming `queue`.
    pub pool: WorkerPool,
    /// Configuration the engine was built from.
    pub config: QuireConfig,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// The tenant used by the convenience helpers.
    pub fn tenant(&self) -> TenantId {
        TenantId::from("tenant-test")
    }

    /// The acting user used by the convenience helpers.
    pub fn user(&self) -> UserId {
        UserId::from("user-test")
    }

    /// Subscribe the default tenant's `url` to `events`.
    pub async fn subscribe(
        &self,
        url: &str,
        events: &[EventType],
    ) -> Result<CreatedSubscription, QuireError> {
        let input = NewSubscription {
            name: format!("hook {url}"),
            description: None,
            url: url.to_string(),
            events: events.iter().map(|e| e.as_str().to_string()).collect(),
        };
        self.engine
            .store
            .create(&self.tenant(), input, &self.user())
            .await
    }

    /// Dispatch an event for the default tenant and return the match count.
    pub async fn emit(&self, event_type: EventType, data: serde_json::Value) -> usize {
        let event = DomainEvent::new(self.tenant(), event_type, data);
        self.engine.dispatcher.dispatch(&event).await
    }

    /// Run queued jobs until the queue is empty.
    pub async fn drain(&self) -> Result<usize, QuireError> {
        self.pool.drain().await
    }

    /// Every delivery row, in insertion order.
    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.memory.all_deliveries().await
    }
}
