// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the repository, queue, and audit traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use quire_config::model::StorageConfig;
use quire_core::{
    AuditEntry, AuditSink, ClaimedJob, DELIVER_JOB, Delivery, DeliveryFilter, DeliveryId,
    DeliveryJob, DeliveryOutcome, DeliveryRepository, DeliveryStatus, FailedJob, HealthStatus,
    JobQueue, JobSource, QuireError, StorageAdapter, Subscription, SubscriptionChanges,
    SubscriptionId, SubscriptionRepository, SubscriptionUpdate, TenantId,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, QuireError> {
        self.db.get().ok_or_else(|| QuireError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    /// Pending and in-flight `webhook/deliver` jobs.
    pub async fn queue_backlog(&self) -> Result<(u64, u64), QuireError> {
        queries::queue::backlog(self.db()?, DELIVER_JOB).await
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn initialize(&self) -> Result<(), QuireError> {
        let path = self.config.database_path.clone();
        let db = Database::open_with(&path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| QuireError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), QuireError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, QuireError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("storage not initialized".to_string()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteStorage {
    async fn insert_subscription(
        &self,
        subscription: &Subscription,
        max_active: usize,
    ) -> Result<bool, QuireError> {
        queries::subscriptions::insert_subscription(self.db()?, subscription, max_active).await
    }

    async fn get_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, QuireError> {
        queries::subscriptions::get_subscription(self.db()?, tenant_id, id).await
    }

    async fn list_subscriptions(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Subscription>, QuireError> {
        queries::subscriptions::list_subscriptions(self.db()?, tenant_id).await
    }

    async fn list_active_subscriptions(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Subscription>, QuireError> {
        queries::subscriptions::list_active_subscriptions(self.db()?, tenant_id).await
    }

    async fn update_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        changes: &SubscriptionChanges,
        max_active: usize,
    ) -> Result<SubscriptionUpdate, QuireError> {
        queries::subscriptions::update_subscription(self.db()?, tenant_id, id, changes, max_active)
            .await
    }

    async fn set_secret_hash(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        secret_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, QuireError> {
        queries::subscriptions::set_secret_hash(self.db()?, tenant_id, id, secret_hash, updated_at)
            .await
    }

    async fn delete_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<bool, QuireError> {
        queries::subscriptions::delete_subscription(self.db()?, tenant_id, id).await
    }

    async fn record_delivery_result(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<(), QuireError> {
        queries::subscriptions::record_delivery_result(self.db()?, tenant_id, id, status, at).await
    }
}

#[async_trait]
impl DeliveryRepository for SqliteStorage {
    async fn insert_delivery(&self, delivery: &Delivery) -> Result<(), QuireError> {
        queries::deliveries::insert_delivery(self.db()?, delivery).await
    }

    async fn insert_retry(&self, delivery: &Delivery) -> Result<bool, QuireError> {
        queries::deliveries::insert_retry(self.db()?, delivery).await
    }

    async fn get_delivery(
        &self,
        tenant_id: &TenantId,
        id: &DeliveryId,
    ) -> Result<Option<Delivery>, QuireError> {
        queries::deliveries::get_delivery(self.db()?, tenant_id, id).await
    }

    async fn list_deliveries(
        &self,
        tenant_id: &TenantId,
        filter: &DeliveryFilter,
    ) -> Result<Vec<Delivery>, QuireError> {
        queries::deliveries::list_deliveries(self.db()?, tenant_id, filter).await
    }

    async fn complete_delivery(
        &self,
        tenant_id: &TenantId,
        id: &DeliveryId,
        outcome: &DeliveryOutcome,
    ) -> Result<bool, QuireError> {
        queries::deliveries::complete_delivery(self.db()?, tenant_id, id, outcome).await
    }
}

#[async_trait]
impl AuditSink for SqliteStorage {
    async fn record(&self, entry: &AuditEntry) -> Result<(), QuireError> {
        queries::audit::insert_entry(self.db()?, entry).await
    }
}

#[async_trait]
impl JobQueue for SqliteStorage {
    async fn enqueue(&self, job: &DeliveryJob) -> Result<(), QuireError> {
        let payload = serde_json::to_string(job)
            .map_err(|e| QuireError::Queue(format!("failed to encode job: {e}")))?;
        let id = queries::queue::enqueue(self.db()?, DELIVER_JOB, &payload).await?;
        debug!(queue_id = id, delivery_id = %job.delivery_id, "job enqueued");
        Ok(())
    }
}

#[async_trait]
impl JobSource for SqliteStorage {
    async fn claim(&self) -> Result<Option<ClaimedJob>, QuireError> {
        loop {
            let Some(entry) = queries::queue::dequeue(self.db()?, DELIVER_JOB).await? else {
                return Ok(None);
            };
            match serde_json::from_str::<DeliveryJob>(&entry.payload) {
                Ok(job) => {
                    return Ok(Some(ClaimedJob {
                        receipt: entry.id,
                        job,
                    }));
                }
                Err(e) => {
                    // A payload that cannot be decoded will never succeed; park it.
                    warn!(queue_id = entry.id, error = %e, "discarding malformed delivery job");
                    queries::queue::fail_permanently(self.db()?, entry.id).await?;
                }
            }
        }
    }

    async fn ack(&self, receipt: i64) -> Result<(), QuireError> {
        queries::queue::ack(self.db()?, receipt).await
    }

    async fn fail(&self, receipt: i64) -> Result<FailedJob, QuireError> {
        if queries::queue::fail(self.db()?, receipt).await? {
            warn!(queue_id = receipt, "delivery job out of attempts");
            Ok(FailedJob::DeadLettered)
        } else {
            Ok(FailedJob::Requeued)
        }
    }
}
