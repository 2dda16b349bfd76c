// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory repositories and audit sink for deterministic testing.
//!
//! `MemoryStore` mirrors the tenant scoping and conditional-update rules of
//! the SQLite backend, keeps every audit entry for assertions, and can be
//! told to reject delivery inserts or reads for chosen rows.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use quire_core::{
    AuditEntry, AuditSink, Delivery, DeliveryFilter, DeliveryId, DeliveryOutcome,
    DeliveryRepository, DeliveryStatus, HealthStatus, QuireError, StorageAdapter, Subscription,
    SubscriptionChanges, SubscriptionId, SubscriptionRepository, SubscriptionUpdate, TenantId,
};

/// A storage backend held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    subscriptions: Mutex<Vec<Subscription>>,
    deliveries: Mutex<Vec<Delivery>>,
    audit: Mutex<Vec<AuditEntry>>,
    rejected_inserts: Mutex<HashSet<SubscriptionId>>,
    failing_reads: Mutex<HashSet<DeliveryId>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `insert_delivery` for `subscription_id` fail.
    pub async fn reject_delivery_inserts_for(&self, subscription_id: &SubscriptionId) {
        self.rejected_inserts
            .lock()
            .await
            .insert(subscription_id.clone());
    }

    /// Make every later `get_delivery` of `delivery_id` fail, as if the
    /// backend were unreachable for that row.
    pub async fn fail_reads_of_delivery(&self, delivery_id: &DeliveryId) {
        self.failing_reads.lock().await.insert(delivery_id.clone());
    }

    /// Every delivery row, in insertion order, across all tenants.
    pub async fn all_deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().await.clone()
    }

    /// Every subscription row, in insertion order, across all tenants.
    pub async fn all_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().await.clone()
    }

    /// Every audit entry recorded so far.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().await.clone()
    }

    async fn check_insert(&self, delivery: &Delivery) -> Result<(), QuireError> {
        if self
            .rejected_inserts
            .lock()
            .await
            .contains(&delivery.subscription_id)
        {
            return Err(QuireError::Storage {
                source: format!(
                    "injected insert failure for subscription {}",
                    delivery.subscription_id
                )
                .into(),
            });
        }
        Ok(())
    }

    /// Overwrite a delivery row as-is, bypassing the pending guard.
    ///
    /// Lets tests stage terminal rows without running a worker.
    pub async fn put_delivery(&self, delivery: Delivery) {
        let mut rows = self.deliveries.lock().await;
        match rows.iter_mut().find(|d| d.id == delivery.id) {
            Some(row) => *row = delivery,
            None => rows.push(delivery),
        }
    }
}

#[async_trait]
impl StorageAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn initialize(&self) -> Result<(), QuireError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), QuireError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, QuireError> {
        Ok(HealthStatus::Healthy)
    }
}

fn owned(sub: &Subscription, tenant_id: &TenantId, id: &SubscriptionId) -> bool {
    sub.tenant_id == *tenant_id && sub.id == *id
}

fn active_count(rows: &[Subscription], tenant_id: &TenantId) -> usize {
    rows.iter()
        .filter(|s| s.tenant_id == *tenant_id && s.is_active)
        .count()
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn insert_subscription(
        &self,
        subscription: &Subscription,
        max_active: usize,
    ) -> Result<bool, QuireError> {
        let mut rows = self.subscriptions.lock().await;
        if rows.iter().any(|s| s.id == subscription.id) {
            return Err(QuireError::Storage {
                source: format!("duplicate subscription id {}", subscription.id).into(),
            });
        }
        if subscription.is_active && active_count(&rows, &subscription.tenant_id) >= max_active {
            return Ok(false);
        }
        rows.push(subscription.clone());
        Ok(true)
    }

    async fn get_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, QuireError> {
        let rows = self.subscriptions.lock().await;
        Ok(rows.iter().find(|s| owned(s, tenant_id, id)).cloned())
    }

    async fn list_subscriptions(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Subscription>, QuireError> {
        let rows = self.subscriptions.lock().await;
        Ok(rows
            .iter()
            .rev()
            .filter(|s| s.tenant_id == *tenant_id)
            .cloned()
            .collect())
    }

    async fn list_active_subscriptions(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Subscription>, QuireError> {
        let rows = self.subscriptions.lock().await;
        Ok(rows
            .iter()
            .filter(|s| s.tenant_id == *tenant_id && s.is_active)
            .cloned()
            .collect())
    }

    async fn update_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        changes: &SubscriptionChanges,
        max_active: usize,
    ) -> Result<SubscriptionUpdate, QuireError> {
        let mut rows = self.subscriptions.lock().await;
        let active = active_count(&rows, tenant_id);
        let Some(row) = rows.iter_mut().find(|s| owned(s, tenant_id, id)) else {
            return Ok(SubscriptionUpdate::NotFound);
        };
        if changes.reactivates(row) && active >= max_active {
            return Ok(SubscriptionUpdate::QuotaExceeded);
        }
        changes.apply_to(row);
        Ok(SubscriptionUpdate::Updated(row.clone()))
    }

    async fn set_secret_hash(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        secret_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, QuireError> {
        let mut rows = self.subscriptions.lock().await;
        let Some(row) = rows.iter_mut().find(|s| owned(s, tenant_id, id)) else {
            return Ok(false);
        };
        row.secret_hash = secret_hash.to_string();
        row.updated_at = updated_at;
        Ok(true)
    }

    async fn delete_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<bool, QuireError> {
        let mut rows = self.subscriptions.lock().await;
        let before = rows.len();
        rows.retain(|s| !owned(s, tenant_id, id));
        Ok(rows.len() < before)
    }

    async fn record_delivery_result(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<(), QuireError> {
        let mut rows = self.subscriptions.lock().await;
        if let Some(row) = rows.iter_mut().find(|s| owned(s, tenant_id, id)) {
            row.last_delivery_at = Some(at);
            row.last_delivery_status = Some(status);
            row.consecutive_failures = match status {
                DeliveryStatus::Failed => row.consecutive_failures.saturating_add(1),
                _ => 0,
            };
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryRepository for MemoryStore {
    async fn insert_delivery(&self, delivery: &Delivery) -> Result<(), QuireError> {
        self.check_insert(delivery).await?;
        self.deliveries.lock().await.push(delivery.clone());
        Ok(())
    }

    async fn insert_retry(&self, delivery: &Delivery) -> Result<bool, QuireError> {
        self.check_insert(delivery).await?;
        let mut rows = self.deliveries.lock().await;
        let already_retried = delivery.retry_of.is_some()
            && rows
                .iter()
                .any(|d| d.tenant_id == delivery.tenant_id && d.retry_of == delivery.retry_of);
        if already_retried {
            return Ok(false);
        }
        rows.push(delivery.clone());
        Ok(true)
    }

    async fn get_delivery(
        &self,
        tenant_id: &TenantId,
        id: &DeliveryId,
    ) -> Result<Option<Delivery>, QuireError> {
        if self.failing_reads.lock().await.contains(id) {
            return Err(QuireError::Storage {
                source: format!("injected read failure for delivery {id}").into(),
            });
        }
        let rows = self.deliveries.lock().await;
        Ok(rows
            .iter()
            .find(|d| d.tenant_id == *tenant_id && d.id == *id)
            .cloned())
    }

    async fn list_deliveries(
        &self,
        tenant_id: &TenantId,
        filter: &DeliveryFilter,
    ) -> Result<Vec<Delivery>, QuireError> {
        let rows = self.deliveries.lock().await;
        let matching = rows
            .iter()
            .rev()
            .filter(|d| d.tenant_id == *tenant_id && filter.matches(d))
            .cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn complete_delivery(
        &self,
        tenant_id: &TenantId,
        id: &DeliveryId,
        outcome: &DeliveryOutcome,
    ) -> Result<bool, QuireError> {
        let mut rows = self.deliveries.lock().await;
        let Some(row) = rows.iter_mut().find(|d| {
            d.tenant_id == *tenant_id && d.id == *id && d.status == DeliveryStatus::Pending
        }) else {
            return Ok(false);
        };
        row.status = outcome.status;
        row.response_status_code = outcome.response_status_code;
        row.error_message = outcome.error_message.clone();
        row.duration_ms = Some(outcome.duration_ms);
        row.delivered_at = outcome.succeeded().then_some(outcome.completed_at);
        row.attempt_count += 1;
        Ok(true)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, entry: &AuditEntry) -> Result<(), QuireError> {
        self.audit.lock().await.push(entry.clone());
        Ok(())
    }
}
