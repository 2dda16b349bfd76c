// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery history operations.
//!
//! Rows are append-only apart from the single `pending -> terminal`
//! transition made by the worker attempt that owns the row.

use quire_core::{
    Delivery, DeliveryFilter, DeliveryId, DeliveryOutcome, DeliveryStatus, QuireError,
    SubscriptionId, TenantId,
};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, params};

use super::{format_ts, get_opt_ts, get_parsed, get_ts};
use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, tenant_id, subscription_id, event_id, event_type, payload, status,
     response_status_code, error_message, attempt_count, max_attempts, duration_ms,
     delivered_at, created_at, retry_of";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Delivery> {
    Ok(Delivery {
        id: DeliveryId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        subscription_id: SubscriptionId(row.get(2)?),
        event_id: row.get(3)?,
        event_type: get_parsed(row, 4)?,
        payload: row.get(5)?,
        status: get_parsed(row, 6)?,
        response_status_code: row.get(7)?,
        error_message: row.get(8)?,
        attempt_count: row.get(9)?,
        max_attempts: row.get(10)?,
        duration_ms: row.get(11)?,
        delivered_at: get_opt_ts(row, 12)?,
        created_at: get_ts(row, 13)?,
        retry_of: row.get::<_, Option<String>>(14)?.map(DeliveryId),
    })
}

fn insert_row(conn: &Connection, d: &Delivery) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO webhook_deliveries (id, tenant_id, subscription_id, event_id,
             event_type, payload, status, response_status_code, error_message,
             attempt_count, max_attempts, duration_ms, delivered_at, created_at, retry_of)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            d.id.as_str(),
            d.tenant_id.as_str(),
            d.subscription_id.as_str(),
            d.event_id,
            d.event_type.as_str(),
            d.payload,
            d.status.to_string(),
            d.response_status_code,
            d.error_message,
            d.attempt_count,
            d.max_attempts,
            d.duration_ms,
            d.delivered_at.as_ref().map(format_ts),
            format_ts(&d.created_at),
            d.retry_of.as_ref().map(|id| id.as_str().to_string()),
        ],
    )?;
    Ok(())
}

/// Insert a new delivery row.
pub async fn insert_delivery(db: &Database, delivery: &Delivery) -> Result<(), QuireError> {
    let d = delivery.clone();
    db.connection()
        .call(move |conn| insert_row(conn, &d))
        .await
        .map_err(map_tr_err)
}

/// Insert a retry row. Returns false when the unique `retry_of` index shows
/// the original was already retried.
pub async fn insert_retry(db: &Database, delivery: &Delivery) -> Result<bool, QuireError> {
    let d = delivery.clone();
    db.connection()
        .call(move |conn| match insert_row(conn, &d) {
            Ok(()) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        })
        .await
        .map_err(map_tr_err)
}

/// Get one delivery owned by `tenant_id`.
pub async fn get_delivery(
    db: &Database,
    tenant_id: &TenantId,
    id: &DeliveryId,
) -> Result<Option<Delivery>, QuireError> {
    let tenant_id = tenant_id.to_string();
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM webhook_deliveries WHERE tenant_id = ?1 AND id = ?2"),
                params![tenant_id, id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// List deliveries matching `filter`, newest first.
pub async fn list_deliveries(
    db: &Database,
    tenant_id: &TenantId,
    filter: &DeliveryFilter,
) -> Result<Vec<Delivery>, QuireError> {
    let mut sql = format!("SELECT {COLUMNS} FROM webhook_deliveries WHERE tenant_id = ?");
    let mut args: Vec<Box<dyn ToSql + Send>> = vec![Box::new(tenant_id.to_string())];
    if let Some(sub) = &filter.subscription_id {
        sql.push_str(" AND subscription_id = ?");
        args.push(Box::new(sub.to_string()));
    }
    if let Some(event_id) = &filter.event_id {
        sql.push_str(" AND event_id = ?");
        args.push(Box::new(event_id.clone()));
    }
    if let Some(status) = filter.status {
        sql.push_str(" AND status = ?");
        args.push(Box::new(status.to_string()));
    }
    sql.push_str(" ORDER BY created_at DESC, rowid DESC");
    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        args.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref() as &dyn ToSql).collect();
            let rows = stmt.query_map(params.as_slice(), from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Write the terminal outcome of a pending delivery.
///
/// The `status = 'pending'` guard makes the transition happen at most once.
pub async fn complete_delivery(
    db: &Database,
    tenant_id: &TenantId,
    id: &DeliveryId,
    outcome: &DeliveryOutcome,
) -> Result<bool, QuireError> {
    let tenant_id = tenant_id.to_string();
    let id = id.to_string();
    let outcome = outcome.clone();
    db.connection()
        .call(move |conn| {
            let delivered_at = (outcome.status == DeliveryStatus::Delivered)
                .then(|| format_ts(&outcome.completed_at));
            let changed = conn.execute(
                "UPDATE webhook_deliveries
                 SET status = ?1, response_status_code = ?2, error_message = ?3,
                     duration_ms = ?4, delivered_at = ?5, attempt_count = attempt_count + 1
                 WHERE tenant_id = ?6 AND id = ?7 AND status = 'pending'",
                params![
                    outcome.status.to_string(),
                    outcome.response_status_code,
                    outcome.error_message,
                    outcome.duration_ms,
                    delivered_at,
                    tenant_id,
                    id,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}
