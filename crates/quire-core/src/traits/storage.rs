// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends.

use async_trait::async_trait;

use crate::error::QuireError;
use crate::traits::audit::AuditSink;
use crate::traits::repository::{DeliveryRepository, SubscriptionRepository};
use crate::types::HealthStatus;

/// A persistence backend providing every repository the engine needs.
#[async_trait]
pub trait StorageAdapter: SubscriptionRepository + DeliveryRepository + AuditSink {
    /// Short backend name for logs (e.g. `sqlite`).
    fn name(&self) -> &str;

    /// Opens connections and applies migrations.
    async fn initialize(&self) -> Result<(), QuireError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), QuireError>;

    async fn health_check(&self) -> Result<HealthStatus, QuireError>;
}
