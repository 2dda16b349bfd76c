// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema migrations, embedded from `migrations/` with refinery.
//!
//! `V1__webhooks.sql` creates the subscription, delivery, audit and job
//! queue tables. Applied versions are recorded in
//! `refinery_schema_history`, so reopening a database is a no-op.

use quire_core::QuireError;
use tracing::info;

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// Apply any migrations the database has not seen yet.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), QuireError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(QuireError::storage)?;
    for migration in report.applied_migrations() {
        info!(version = migration.version(), name = migration.name(), "applied migration");
    }
    Ok(())
}
