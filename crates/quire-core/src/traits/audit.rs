// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write-only audit log sink.

use async_trait::async_trait;

use crate::error::QuireError;
use crate::records::AuditEntry;

/// Receives one entry per subscription mutation and per retry.
///
/// There is no read path from the webhook engine.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), QuireError>;
}
