// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `webhook/deliver` queue for deterministic testing.
//!
//! `MemoryQueue` implements both [`JobQueue`] and [`JobSource`]. Claimed jobs
//! that fail go back to the ready queue until they reach the attempt limit,
//! matching the durable SQLite queue. Every enqueued job is also kept in a
//! history list for assertions.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use quire_core::{
    ClaimedJob, DeliveryJob, FailedJob, JobQueue, JobSource, QuireError, SubscriptionId,
};

/// Hand-outs per job before it is parked as dead.
const MAX_ATTEMPTS: u32 = 3;

#[derive(Default)]
struct QueueState {
    next_receipt: i64,
    ready: VecDeque<(i64, DeliveryJob, u32)>,
    in_flight: HashMap<i64, (DeliveryJob, u32)>,
    history: Vec<DeliveryJob>,
    acked: usize,
    dead: Vec<DeliveryJob>,
    rejected: HashSet<SubscriptionId>,
}

/// An in-memory job queue.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later enqueue for `subscription_id` fail.
    pub async fn reject_enqueue_for(&self, subscription_id: &SubscriptionId) {
        self.state
            .lock()
            .await
            .rejected
            .insert(subscription_id.clone());
    }

    /// Every job ever enqueued, in order.
    pub async fn enqueued(&self) -> Vec<DeliveryJob> {
        self.state.lock().await.history.clone()
    }

    /// Jobs waiting to be claimed.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Jobs settled with `ack`.
    pub async fn acked_count(&self) -> usize {
        self.state.lock().await.acked
    }

    /// Jobs that exhausted their attempts.
    pub async fn dead_letters(&self) -> Vec<DeliveryJob> {
        self.state.lock().await.dead.clone()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &DeliveryJob) -> Result<(), QuireError> {
        let mut state = self.state.lock().await;
        if state.rejected.contains(&job.subscription_id) {
            return Err(QuireError::Queue(format!(
                "injected enqueue failure for subscription {}",
                job.subscription_id
            )));
        }
        state.next_receipt += 1;
        let receipt = state.next_receipt;
        state.ready.push_back((receipt, job.clone(), 0));
        state.history.push(job.clone());
        Ok(())
    }
}

#[async_trait]
impl JobSource for MemoryQueue {
    async fn claim(&self) -> Result<Option<ClaimedJob>, QuireError> {
        let mut state = self.state.lock().await;
        let Some((receipt, job, attempts)) = state.ready.pop_front() else {
            return Ok(None);
        };
        state.in_flight.insert(receipt, (job.clone(), attempts));
        Ok(Some(ClaimedJob { receipt, job }))
    }

    async fn ack(&self, receipt: i64) -> Result<(), QuireError> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&receipt).is_some() {
            state.acked += 1;
        }
        Ok(())
    }

    async fn fail(&self, receipt: i64) -> Result<FailedJob, QuireError> {
        let mut state = self.state.lock().await;
        let Some((job, attempts)) = state.in_flight.remove(&receipt) else {
            return Ok(FailedJob::Requeued);
        };
        let attempts = attempts + 1;
        if attempts >= MAX_ATTEMPTS {
            state.dead.push(job);
            Ok(FailedJob::DeadLettered)
        } else {
            state.ready.push_back((receipt, job, attempts));
            Ok(FailedJob::Requeued)
        }
    }
}
