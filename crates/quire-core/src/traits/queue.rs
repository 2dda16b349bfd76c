// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Producer and consumer sides of the `webhook/deliver` job queue.

use async_trait::async_trait;

use crate::error::QuireError;
use crate::records::DeliveryJob;

/// Producer side: the dispatcher and retry coordinator enqueue jobs here.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &DeliveryJob) -> Result<(), QuireError>;
}

/// A job claimed by a consumer, with the receipt used to settle it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub receipt: i64,
    pub job: DeliveryJob,
}

/// What the queue did with a job reported through [`JobSource::fail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedJob {
    /// Back in the queue for another hand-out.
    Requeued,
    /// Out of attempts; it will never be handed out again.
    DeadLettered,
}

/// Consumer side: at-least-once delivery of jobs to workers.
///
/// A claimed job that is neither acked nor failed becomes claimable again
/// once its lease expires.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Claim the next available job, or `None` if the queue is idle.
    async fn claim(&self) -> Result<Option<ClaimedJob>, QuireError>;

    /// Settle a job as fully processed.
    async fn ack(&self, receipt: i64) -> Result<(), QuireError>;

    /// Report that processing could not complete; the queue decides whether
    /// to hand the job out again.
    async fn fail(&self, receipt: i64) -> Result<FailedJob, QuireError>;
}
