// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit log.

use quire_core::{AuditEntry, QuireError};
use rusqlite::params;

use super::{format_ts, to_json};
use crate::database::{Database, map_tr_err};

/// Append one audit entry.
pub async fn insert_entry(db: &Database, entry: &AuditEntry) -> Result<(), QuireError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO audit_log (tenant_id, user_id, action, resource_type, resource_id,
                     details, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.tenant_id.as_str(),
                    entry.user_id.as_str(),
                    entry.action.to_string(),
                    entry.resource_type,
                    entry.resource_id,
                    to_json(&entry.details)?,
                    format_ts(&entry.created_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
