// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pool draining the `webhook/deliver` queue.
//!
//! Each worker loops claim -> process -> ack/fail, sleeping for the poll
//! interval when the queue is idle. Cancelling the token stops the loops
//! between jobs; an attempt already in flight runs to completion and writes
//! its outcome before the worker exits. A job the queue dead-letters has its
//! row settled as `failed` so it can be retried by hand.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use quire_core::{DeliveryJob, FailedJob, JobSource, QuireError};

use crate::worker::DeliveryWorker;

/// A fixed-size pool of delivery workers.
#[derive(Clone)]
pub struct WorkerPool {
    worker: Arc<DeliveryWorker>,
    source: Arc<dyn JobSource>,
    concurrency: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        worker: Arc<DeliveryWorker>,
        source: Arc<dyn JobSource>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            worker,
            source,
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    /// Run all workers until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(workers = self.concurrency, "delivery worker pool started");
        let mut tasks = JoinSet::new();
        for index in 0..self.concurrency {
            let pool = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { pool.consume(index, cancel).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "delivery worker task aborted");
            }
        }
        info!("delivery worker pool stopped");
    }

    /// Claim and settle at most one job. Returns whether a job was handled.
    pub async fn run_once(&self) -> Result<bool, QuireError> {
        let Some(claimed) = self.source.claim().await? else {
            return Ok(false);
        };
        match self.worker.process(&claimed.job).await {
            Ok(_) => self.source.ack(claimed.receipt).await?,
            Err(e) => {
                warn!(
                    delivery_id = %claimed.job.delivery_id,
                    error = %e,
                    "delivery job failed"
                );
                if self.source.fail(claimed.receipt).await? == FailedJob::DeadLettered {
                    self.settle_dead_letter(&claimed.job, &e).await;
                }
            }
        }
        Ok(true)
    }

    /// Handle jobs until the queue is empty. Returns the number handled.
    pub async fn drain(&self) -> Result<usize, QuireError> {
        let mut handled = 0;
        while self.run_once().await? {
            handled += 1;
        }
        Ok(handled)
    }

    async fn settle_dead_letter(&self, job: &DeliveryJob, cause: &QuireError) {
        match self.worker.abandon(job, cause).await {
            Ok(true) => warn!(
                delivery_id = %job.delivery_id,
                "delivery job dead-lettered, row marked failed"
            ),
            Ok(false) => debug!(delivery_id = %job.delivery_id, "dead-lettered row already settled"),
            Err(e) => error!(
                delivery_id = %job.delivery_id,
                error = %e,
                "failed to settle dead-lettered delivery"
            ),
        }
    }

    async fn consume(&self, index: usize, cancel: CancellationToken) {
        debug!(worker = index, "delivery worker started");
        while !cancel.is_cancelled() {
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => warn!(worker = index, error = %e, "queue error"),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        debug!(worker = index, "delivery worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quire_core::{
        Delivery, DeliveryRepository, DeliveryStatus, EventType, JobQueue, SubscriptionId,
        TenantId,
    };
    use quire_security::KeyDeriver;
    use quire_test_utils::{MemoryQueue, MemoryStore};
    use secrecy::SecretString;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pool(memory: &Arc<MemoryStore>, queue: &Arc<MemoryQueue>, workers: usize) -> WorkerPool {
        let keys =
            KeyDeriver::new(&SecretString::from("pool-tests-master-key-0123456789abcdef".to_string()))
                .unwrap();
        let worker = DeliveryWorker::new(
            memory.clone(),
            memory.clone(),
            reqwest::Client::new(),
            keys,
            Duration::from_secs(5),
        );
        WorkerPool::new(
            Arc::new(worker),
            queue.clone(),
            workers,
            Duration::from_millis(10),
        )
    }

    async fn enqueue(memory: &MemoryStore, queue: &MemoryQueue, url: &str, n: usize) {
        for i in 0..n {
            let delivery = Delivery::pending(
                TenantId::from("tenant-a"),
                SubscriptionId::from("sub-1"),
                format!("evt-{i}"),
                EventType::IsbnAssigned,
                "{}".into(),
            );
            memory.insert_delivery(&delivery).await.unwrap();
            queue
                .enqueue(&DeliveryJob::for_delivery(&delivery, url))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn drain_settles_every_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        let memory = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        enqueue(&memory, &queue, &server.uri(), 3).await;

        assert_eq!(pool(&memory, &queue, 1).drain().await.unwrap(), 3);
        assert_eq!(queue.acked_count().await, 3);
        let rows = memory.all_deliveries().await;
        assert!(rows.iter().all(|d| d.status == DeliveryStatus::Delivered));
    }

    #[tokio::test]
    async fn dead_lettered_job_leaves_a_failed_row() {
        let memory = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        enqueue(&memory, &queue, "https://hooks.example.com/never-called", 1).await;
        let row = memory.all_deliveries().await.remove(0);
        memory.fail_reads_of_delivery(&row.id).await;

        assert_eq!(pool(&memory, &queue, 1).drain().await.unwrap(), 3);
        assert_eq!(queue.dead_letters().await.len(), 1);
        assert_eq!(queue.acked_count().await, 0);

        let settled = memory.all_deliveries().await.remove(0);
        assert_eq!(settled.status, DeliveryStatus::Failed);
        assert_eq!(settled.response_status_code, None);
        assert!(
            settled
                .error_message
                .as_deref()
                .unwrap()
                .starts_with("Delivery abandoned after repeated processing failures: ")
        );
    }

    #[tokio::test]
    async fn run_stops_on_cancel_after_draining() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let memory = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        enqueue(&memory, &queue, &server.uri(), 5).await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pool(&memory, &queue, 3).run(cancel.clone()));

        let deadline = Utc::now() + chrono::Duration::seconds(10);
        while queue.acked_count().await < 5 && Utc::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pool stops after cancellation")
            .unwrap();

        assert_eq!(queue.acked_count().await, 5);
        assert_eq!(queue.ready_len().await, 0);
    }
}
