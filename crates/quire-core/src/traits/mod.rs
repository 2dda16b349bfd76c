// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits injected into the webhook components.
//!
//! Every component receives its persistence, queue, and audit dependencies
//! through these traits, so the engine runs against SQLite in production and
//! against in-memory fakes in tests.

pub mod audit;
pub mod queue;
pub mod repository;
pub mod storage;

pub use audit::AuditSink;
pub use queue::{ClaimedJob, FailedJob, JobQueue, JobSource};
pub use repository::{DeliveryRepository, SubscriptionRepository};
pub use storage::StorageAdapter;
