// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue with lease-based, at-least-once hand-out.

use quire_core::QuireError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

/// A claimed queue row.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: i64,
    pub job_name: String,
    pub payload: String,
    pub attempts: u32,
}

/// Enqueue a new job. Returns the auto-generated queue entry ID.
pub async fn enqueue(db: &Database, job_name: &str, payload: &str) -> Result<i64, QuireError> {
    let job_name = job_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO job_queue (job_name, payload) VALUES (?1, ?2)",
                params![job_name, payload],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Claim the next available job with the given name.
///
/// Atomically selects the oldest pending job, or a processing job whose
/// lease has expired, and marks it as "processing" with a 5-minute lease.
/// Returns `None` if the queue is empty.
pub async fn dequeue(db: &Database, job_name: &str) -> Result<Option<QueueEntry>, QuireError> {
    let job_name = job_name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let entry = tx
                .query_row(
                    "SELECT id, job_name, payload, attempts
                     FROM job_queue
                     WHERE job_name = ?1
                       AND (status = 'pending'
                            OR (status = 'processing'
                                AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))
                     ORDER BY id ASC
                     LIMIT 1",
                    params![job_name],
                    |row| {
                        Ok(QueueEntry {
                            id: row.get(0)?,
                            job_name: row.get(1)?,
                            payload: row.get(2)?,
                            attempts: row.get(3)?,
                        })
                    },
                )
                .optional()?;

            if let Some(entry) = &entry {
                tx.execute(
                    "UPDATE job_queue SET status = 'processing',
                     locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    params![entry.id],
                )?;
            }
            tx.commit()?;
            Ok(entry)
        })
        .await
        .map_err(map_tr_err)
}

/// Acknowledge successful processing of a job.
///
/// Marks the entry as "completed".
pub async fn ack(db: &Database, id: i64) -> Result<(), QuireError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE job_queue SET status = 'completed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a job as failed.
///
/// Increments attempts. If attempts >= max_attempts, sets status to "failed"
/// and returns true. Otherwise resets to "pending" for retry, clears the
/// lock, and returns false.
pub async fn fail(db: &Database, id: i64) -> Result<bool, QuireError> {
    db.connection()
        .call(move |conn| {
            let Some((attempts, max_attempts)) = conn
                .query_row(
                    "SELECT attempts, max_attempts FROM job_queue WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?
            else {
                return Ok(false);
            };

            let new_attempts = attempts + 1;
            let exhausted = new_attempts >= max_attempts;
            let status = if exhausted { "failed" } else { "pending" };
            conn.execute(
                "UPDATE job_queue SET status = ?1, attempts = ?2, locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![status, new_attempts, id],
            )?;
            Ok(exhausted)
        })
        .await
        .map_err(map_tr_err)
}

/// Move a job straight to "failed", skipping any remaining attempts.
pub async fn fail_permanently(db: &Database, id: i64) -> Result<(), QuireError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE job_queue SET status = 'failed', attempts = attempts + 1,
                 locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Number of jobs with the given name in each non-terminal state:
/// `(pending, processing)`.
pub async fn backlog(db: &Database, job_name: &str) -> Result<(u64, u64), QuireError> {
    let job_name = job_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT
                     COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                     COALESCE(SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END), 0)
                 FROM job_queue WHERE job_name = ?1",
                params![job_name],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
            )
        })
        .await
        .map_err(map_tr_err)
}
