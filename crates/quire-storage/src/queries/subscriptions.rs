// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription CRUD operations. Every statement is filtered by tenant.

use chrono::{DateTime, Utc};
use quire_core::{
    DeliveryStatus, QuireError, Subscription, SubscriptionChanges, SubscriptionId,
    SubscriptionUpdate, TenantId,
};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::{format_ts, get_json, get_opt_parsed, get_opt_ts, get_ts, to_json};
use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, tenant_id, name, description, url, events, is_active, secret_hash,
     last_delivery_at, last_delivery_status, consecutive_failures, created_by,
     created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: SubscriptionId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        url: row.get(4)?,
        events: get_json(row, 5)?,
        is_active: row.get(6)?,
        secret_hash: row.get(7)?,
        last_delivery_at: get_opt_ts(row, 8)?,
        last_delivery_status: get_opt_parsed(row, 9)?,
        consecutive_failures: row.get(10)?,
        created_by: row.get::<_, String>(11)?.into(),
        created_at: get_ts(row, 12)?,
        updated_at: get_ts(row, 13)?,
    })
}

/// Insert a new subscription, refusing an active row when the tenant is
/// already at `max_active`. Returns false when refused.
///
/// The count and the insert share one IMMEDIATE transaction, so concurrent
/// creates cannot overshoot the cap.
pub async fn insert_subscription(
    db: &Database,
    sub: &Subscription,
    max_active: usize,
) -> Result<bool, QuireError> {
    let sub = sub.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if sub.is_active && active_count(&tx, sub.tenant_id.as_str())? >= max_active {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO webhook_subscriptions (id, tenant_id, name, description, url, events,
                     is_active, secret_hash, last_delivery_at, last_delivery_status,
                     consecutive_failures, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    sub.id.as_str(),
                    sub.tenant_id.as_str(),
                    sub.name,
                    sub.description,
                    sub.url,
                    to_json(&sub.events)?,
                    sub.is_active,
                    sub.secret_hash,
                    sub.last_delivery_at.as_ref().map(format_ts),
                    sub.last_delivery_status.map(|s| s.to_string()),
                    sub.consecutive_failures,
                    sub.created_by.as_str(),
                    format_ts(&sub.created_at),
                    format_ts(&sub.updated_at),
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

fn active_count(conn: &Connection, tenant_id: &str) -> rusqlite::Result<usize> {
    conn.query_row(
        "SELECT COUNT(*) FROM webhook_subscriptions WHERE tenant_id = ?1 AND is_active = 1",
        params![tenant_id],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| usize::try_from(n).unwrap_or(0))
}

fn select_one(conn: &Connection, tenant_id: &str, id: &str) -> rusqlite::Result<Option<Subscription>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM webhook_subscriptions WHERE tenant_id = ?1 AND id = ?2"),
        params![tenant_id, id],
        from_row,
    )
    .optional()
}

/// Get one subscription owned by `tenant_id`.
pub async fn get_subscription(
    db: &Database,
    tenant_id: &TenantId,
    id: &SubscriptionId,
) -> Result<Option<Subscription>, QuireError> {
    let tenant_id = tenant_id.to_string();
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_one(conn, &tenant_id, &id))
        .await
        .map_err(map_tr_err)
}

/// List a tenant's subscriptions, newest first.
pub async fn list_subscriptions(
    db: &Database,
    tenant_id: &TenantId,
) -> Result<Vec<Subscription>, QuireError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM webhook_subscriptions
                 WHERE tenant_id = ?1 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![tenant_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// List a tenant's active subscriptions, oldest first.
pub async fn list_active_subscriptions(
    db: &Database,
    tenant_id: &TenantId,
) -> Result<Vec<Subscription>, QuireError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM webhook_subscriptions
                 WHERE tenant_id = ?1 AND is_active = 1 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![tenant_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Write the columns set in `changes` and return the stored row.
///
/// Only those columns appear in the UPDATE, so a concurrent change to a
/// different field is never overwritten. Re-activation is checked against
/// `max_active` inside the same IMMEDIATE transaction.
pub async fn update_subscription(
    db: &Database,
    tenant_id: &TenantId,
    id: &SubscriptionId,
    changes: &SubscriptionChanges,
    max_active: usize,
) -> Result<SubscriptionUpdate, QuireError> {
    let tenant_id = tenant_id.to_string();
    let id = id.to_string();
    let changes = changes.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(current) = select_one(&tx, &tenant_id, &id)? else {
                return Ok(SubscriptionUpdate::NotFound);
            };
            if changes.reactivates(&current) && active_count(&tx, &tenant_id)? >= max_active {
                return Ok(SubscriptionUpdate::QuotaExceeded);
            }

            let mut sets = vec!["updated_at = ?"];
            let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(format_ts(&changes.updated_at))];
            if let Some(name) = &changes.name {
                sets.push("name = ?");
                args.push(Box::new(name.clone()));
            }
            if let Some(description) = &changes.description {
                sets.push("description = ?");
                args.push(Box::new(description.clone()));
            }
            if let Some(url) = &changes.url {
                sets.push("url = ?");
                args.push(Box::new(url.clone()));
            }
            if let Some(events) = &changes.events {
                sets.push("events = ?");
                args.push(Box::new(to_json(events)?));
            }
            if let Some(active) = changes.is_active {
                sets.push("is_active = ?");
                args.push(Box::new(active));
            }
            args.push(Box::new(tenant_id.clone()));
            args.push(Box::new(id.clone()));

            let sql = format!(
                "UPDATE webhook_subscriptions SET {} WHERE tenant_id = ? AND id = ?",
                sets.join(", ")
            );
            let params: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
            tx.execute(&sql, params.as_slice())?;

            let updated = select_one(&tx, &tenant_id, &id)?;
            tx.commit()?;
            Ok(match updated {
                Some(sub) => SubscriptionUpdate::Updated(sub),
                None => SubscriptionUpdate::NotFound,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the stored secret hash.
pub async fn set_secret_hash(
    db: &Database,
    tenant_id: &TenantId,
    id: &SubscriptionId,
    secret_hash: &str,
    updated_at: DateTime<Utc>,
) -> Result<bool, QuireError> {
    let tenant_id = tenant_id.to_string();
    let id = id.to_string();
    let secret_hash = secret_hash.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE webhook_subscriptions SET secret_hash = ?1, updated_at = ?2
                 WHERE tenant_id = ?3 AND id = ?4",
                params![secret_hash, format_ts(&updated_at), tenant_id, id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Hard-delete a subscription. Its deliveries are kept.
pub async fn delete_subscription(
    db: &Database,
    tenant_id: &TenantId,
    id: &SubscriptionId,
) -> Result<bool, QuireError> {
    let tenant_id = tenant_id.to_string();
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM webhook_subscriptions WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Record the outcome of a delivery on the subscription's health fields.
pub async fn record_delivery_result(
    db: &Database,
    tenant_id: &TenantId,
    id: &SubscriptionId,
    status: DeliveryStatus,
    at: DateTime<Utc>,
) -> Result<(), QuireError> {
    let tenant_id = tenant_id.to_string();
    let id = id.to_string();
    let failed = status == DeliveryStatus::Failed;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE webhook_subscriptions
                 SET last_delivery_at = ?1,
                     last_delivery_status = ?2,
                     consecutive_failures = CASE WHEN ?3 THEN consecutive_failures + 1 ELSE 0 END
                 WHERE tenant_id = ?4 AND id = ?5",
                params![format_ts(&at), status.to_string(), failed, tenant_id, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_core::{EventType, UserId};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_sub(tenant: &str, id: &str, active: bool) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: SubscriptionId::from(id),
            tenant_id: TenantId::from(tenant),
            name: format!("hook {id}"),
            description: None,
            url: "https://hooks.example.com/in".into(),
            events: vec![EventType::TitleCreated, EventType::SaleCreated],
            is_active: active,
            secret_hash: "ab".repeat(32),
            last_delivery_at: None,
            last_delivery_status: None,
            consecutive_failures: 0,
            created_by: UserId::from("user-1"),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_get_is_tenant_scoped() {
        let (db, _dir) = setup_db().await;
        insert_subscription(&db, &make_sub("tenant-a", "s1", true), 10).await.unwrap();

        let tenant_a = TenantId::from("tenant-a");
        let got = get_subscription(&db, &tenant_a, &SubscriptionId::from("s1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.events, vec![EventType::TitleCreated, EventType::SaleCreated]);
        assert_eq!(got.secret_hash, "ab".repeat(32));

        let other = get_subscription(&db, &TenantId::from("tenant-b"), &SubscriptionId::from("s1"))
            .await
            .unwrap();
        assert!(other.is_none());
        assert!(
            !delete_subscription(&db, &TenantId::from("tenant-b"), &SubscriptionId::from("s1"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn active_listing_and_count() {
        let (db, _dir) = setup_db().await;
        let tenant = TenantId::from("tenant-a");
        insert_subscription(&db, &make_sub("tenant-a", "s1", true), 10).await.unwrap();
        insert_subscription(&db, &make_sub("tenant-a", "s2", false), 10).await.unwrap();
        insert_subscription(&db, &make_sub("tenant-b", "s3", true), 10).await.unwrap();

        assert_eq!(list_subscriptions(&db, &tenant).await.unwrap().len(), 2);
        let active = list_active_subscriptions(&db, &tenant).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id.as_str(), "s1");
    }

    #[tokio::test]
    async fn insert_respects_active_cap() {
        let (db, _dir) = setup_db().await;
        assert!(insert_subscription(&db, &make_sub("tenant-a", "s1", true), 2).await.unwrap());
        assert!(insert_subscription(&db, &make_sub("tenant-a", "s2", true), 2).await.unwrap());
        assert!(!insert_subscription(&db, &make_sub("tenant-a", "s3", true), 2).await.unwrap());
        // Inactive rows and other tenants are not limited.
        assert!(insert_subscription(&db, &make_sub("tenant-a", "s4", false), 2).await.unwrap());
        assert!(insert_subscription(&db, &make_sub("tenant-b", "s5", true), 2).await.unwrap());

        let tenant = TenantId::from("tenant-a");
        assert_eq!(list_active_subscriptions(&db, &tenant).await.unwrap().len(), 2);
        assert!(get_subscription(&db, &tenant, &SubscriptionId::from("s3")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_writes_only_changed_columns() {
        let (db, _dir) = setup_db().await;
        let tenant = TenantId::from("tenant-a");
        let id = SubscriptionId::from("s1");
        insert_subscription(&db, &make_sub("tenant-a", "s1", true), 10).await.unwrap();
        record_delivery_result(&db, &tenant, &id, DeliveryStatus::Failed, Utc::now())
            .await
            .unwrap();

        let rename = SubscriptionChanges {
            name: Some("renamed".into()),
            updated_at: Utc::now(),
            ..Default::default()
        };
        let pause = SubscriptionChanges {
            is_active: Some(false),
            updated_at: Utc::now(),
            ..Default::default()
        };
        update_subscription(&db, &tenant, &id, &rename, 10).await.unwrap();
        let SubscriptionUpdate::Updated(got) =
            update_subscription(&db, &tenant, &id, &pause, 10).await.unwrap()
        else {
            panic!("row should exist");
        };

        assert_eq!(got.name, "renamed");
        assert!(!got.is_active);
        assert_eq!(got.url, "https://hooks.example.com/in");
        assert_eq!(got.consecutive_failures, 1);

        let foreign = update_subscription(&db, &TenantId::from("tenant-b"), &id, &rename, 10)
            .await
            .unwrap();
        assert_eq!(foreign, SubscriptionUpdate::NotFound);
    }

    #[tokio::test]
    async fn reactivation_respects_active_cap() {
        let (db, _dir) = setup_db().await;
        let tenant = TenantId::from("tenant-a");
        insert_subscription(&db, &make_sub("tenant-a", "s1", true), 1).await.unwrap();
        insert_subscription(&db, &make_sub("tenant-a", "s2", false), 1).await.unwrap();

        let resume = SubscriptionChanges {
            is_active: Some(true),
            updated_at: Utc::now(),
            ..Default::default()
        };
        let s2 = SubscriptionId::from("s2");
        assert_eq!(
            update_subscription(&db, &tenant, &s2, &resume, 1).await.unwrap(),
            SubscriptionUpdate::QuotaExceeded
        );
        // Already active: not a re-activation, so the cap does not apply.
        let s1 = SubscriptionId::from("s1");
        assert!(matches!(
            update_subscription(&db, &tenant, &s1, &resume, 1).await.unwrap(),
            SubscriptionUpdate::Updated(_)
        ));
        let got = get_subscription(&db, &tenant, &s2).await.unwrap().unwrap();
        assert!(!got.is_active);
    }

    #[tokio::test]
    async fn delivery_results_track_failures() {
        let (db, _dir) = setup_db().await;
        let tenant = TenantId::from("tenant-a");
        let id = SubscriptionId::from("s1");
        insert_subscription(&db, &make_sub("tenant-a", "s1", true), 10).await.unwrap();

        for _ in 0..3 {
            record_delivery_result(&db, &tenant, &id, DeliveryStatus::Failed, Utc::now())
                .await
                .unwrap();
        }
        let got = get_subscription(&db, &tenant, &id).await.unwrap().unwrap();
        assert_eq!(got.consecutive_failures, 3);
        assert_eq!(got.last_delivery_status, Some(DeliveryStatus::Failed));
        assert!(got.last_delivery_at.is_some());

        record_delivery_result(&db, &tenant, &id, DeliveryStatus::Delivered, Utc::now())
            .await
            .unwrap();
        let got = get_subscription(&db, &tenant, &id).await.unwrap().unwrap();
        assert_eq!(got.consecutive_failures, 0);
        assert_eq!(got.last_delivery_status, Some(DeliveryStatus::Delivered));
    }

    #[tokio::test]
    async fn secret_hash_replaced() {
        let (db, _dir) = setup_db().await;
        let tenant = TenantId::from("tenant-a");
        let id = SubscriptionId::from("s1");
        insert_subscription(&db, &make_sub("tenant-a", "s1", true), 10).await.unwrap();

        assert!(set_secret_hash(&db, &tenant, &id, "new-hash", Utc::now()).await.unwrap());
        let got = get_subscription(&db, &tenant, &id).await.unwrap().unwrap();
        assert_eq!(got.secret_hash, "new-hash");
        assert!(delete_subscription(&db, &tenant, &id).await.unwrap());
        assert!(get_subscription(&db, &tenant, &id).await.unwrap().is_none());
    }
}
