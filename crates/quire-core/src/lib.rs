// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Quire webhook engine.
//!
//! This crate provides the error type, domain records, and the collaborator
//! traits (repositories, job queue, audit sink) used throughout the
//! workspace. Components depend on these traits, never on a concrete store.

pub mod error;
pub mod records;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::QuireError;
pub use records::{
    AuditEntry, Delivery, DeliveryFilter, DeliveryJob, DeliveryOutcome, DomainEvent, Subscription,
    SubscriptionChanges, SubscriptionPatch, SubscriptionUpdate, DELIVER_JOB, MAX_ATTEMPTS_PER_DELIVERY,
};
pub use types::{
    AuditAction, DeliveryId, DeliveryStatus, EventType, HealthStatus, Permission, SubscriptionId,
    TenantId, UserId, TEST_EVENT_TYPE,
};

pub use traits::{
    AuditSink, ClaimedJob, DeliveryRepository, FailedJob, JobQueue, JobSource, StorageAdapter,
    SubscriptionRepository,
};
