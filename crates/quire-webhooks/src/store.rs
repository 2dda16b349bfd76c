// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription store: validated, tenant-scoped CRUD over subscriptions.
//!
//! The store is the only writer of subscription configuration. It enforces
//! the per-tenant cap on active subscriptions, keeps event lists inside the
//! platform enumeration, refuses unsafe endpoint URLs, persists only the hash
//! of each secret, and writes one audit entry per successful mutation.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use quire_config::model::WebhooksConfig;
use quire_core::{
    AuditAction, AuditEntry, AuditSink, EventType, QuireError, Subscription, SubscriptionChanges,
    SubscriptionId, SubscriptionPatch, SubscriptionRepository, SubscriptionUpdate, TenantId,
    UserId,
};
use quire_security::{SubscriptionSecret, generate_secret, validate_webhook_url};

/// Audit `resource_type` for subscription mutations.
pub const SUBSCRIPTION_RESOURCE: &str = "webhook_subscription";

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Input for [`SubscriptionStore::create`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewSubscription {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    pub events: Vec<String>,
}

/// A freshly created subscription and its plaintext secret.
///
/// This is the only time the secret leaves the store.
#[derive(Debug)]
pub struct CreatedSubscription {
    pub subscription: Subscription,
    pub secret: SubscriptionSecret,
}

/// CRUD over subscriptions with validation, quota, and auditing.
pub struct SubscriptionStore {
    repo: Arc<dyn SubscriptionRepository>,
    audit: Arc<dyn AuditSink>,
    max_active: usize,
    allow_insecure_urls: bool,
}

impl SubscriptionStore {
    pub fn new(
        repo: Arc<dyn SubscriptionRepository>,
        audit: Arc<dyn AuditSink>,
        config: &WebhooksConfig,
    ) -> Self {
        Self {
            repo,
            audit,
            max_active: config.max_subscriptions_per_tenant,
            allow_insecure_urls: config.allow_insecure_urls,
        }
    }

    /// Register a new endpoint for `tenant_id`.
    pub async fn create(
        &self,
        tenant_id: &TenantId,
        input: NewSubscription,
        created_by: &UserId,
    ) -> Result<CreatedSubscription, QuireError> {
        let name = validate_name(&input.name)?;
        let description = validate_description(input.description)?;
        let url = self.validate_url(&input.url)?;
        let events = parse_events(&input.events)?;

        let secret = generate_secret()?;
        let now = Utc::now();
        let subscription = Subscription {
            id: SubscriptionId::generate(),
            tenant_id: tenant_id.clone(),
            name,
            description,
            url,
            events,
            is_active: true,
            secret_hash: secret.hash(),
            last_delivery_at: None,
            last_delivery_status: None,
            consecutive_failures: 0,
            created_by: created_by.clone(),
            created_at: now,
            updated_at: now,
        };
        if !self
            .repo
            .insert_subscription(&subscription, self.max_active)
            .await?
        {
            return Err(self.quota_exceeded());
        }

        info!(
            tenant_id = %tenant_id,
            subscription_id = %subscription.id,
            events = subscription.events.len(),
            "webhook subscription created"
        );
        self.audit(
            tenant_id,
            created_by,
            AuditAction::Create,
            &subscription.id,
            json!({
                "name": subscription.name,
                "url": subscription.url,
                "events": subscription.events,
            }),
        )
        .await;

        Ok(CreatedSubscription {
            subscription,
            secret,
        })
    }

    /// Apply `patch` to a subscription. Returns `None` if the tenant has no
    /// such subscription.
    ///
    /// Only the fields present in the patch are validated and written, and
    /// re-activating an inactive subscription counts against the tenant's
    /// cap. An empty patch is rejected.
    pub async fn update(
        &self,
        id: &SubscriptionId,
        tenant_id: &TenantId,
        patch: SubscriptionPatch,
        acting_user: &UserId,
    ) -> Result<Option<Subscription>, QuireError> {
        if patch.is_empty() {
            return Err(QuireError::Validation("No fields to update".into()));
        }
        let changes = SubscriptionChanges {
            name: patch.name.as_deref().map(validate_name).transpose()?,
            description: patch.description.map(validate_description).transpose()?,
            url: patch.url.as_deref().map(|url| self.validate_url(url)).transpose()?,
            events: patch.events.as_deref().map(parse_events).transpose()?,
            is_active: patch.is_active,
            updated_at: Utc::now(),
        };

        let subscription = match self
            .repo
            .update_subscription(tenant_id, id, &changes, self.max_active)
            .await?
        {
            SubscriptionUpdate::Updated(subscription) => subscription,
            SubscriptionUpdate::NotFound => return Ok(None),
            SubscriptionUpdate::QuotaExceeded => return Err(self.quota_exceeded()),
        };

        let changed = changes.changed_fields();
        info!(
            tenant_id = %tenant_id,
            subscription_id = %id,
            changed = ?changed,
            "webhook subscription updated"
        );
        self.audit(
            tenant_id,
            acting_user,
            AuditAction::Update,
            id,
            json!({ "changes": changed }),
        )
        .await;

        Ok(Some(subscription))
    }

    /// Replace the subscription's secret and return the new plaintext once.
    pub async fn regenerate_secret(
        &self,
        id: &SubscriptionId,
        tenant_id: &TenantId,
        acting_user: &UserId,
    ) -> Result<Option<SubscriptionSecret>, QuireError> {
        let secret = generate_secret()?;
        if !self
            .repo
            .set_secret_hash(tenant_id, id, &secret.hash(), Utc::now())
            .await?
        {
            return Ok(None);
        }

        info!(tenant_id = %tenant_id, subscription_id = %id, "webhook secret regenerated");
        self.audit(
            tenant_id,
            acting_user,
            AuditAction::Update,
            id,
            json!({ "secret_regenerated": true }),
        )
        .await;

        Ok(Some(secret))
    }

    /// Hard-delete a subscription. Its delivery history is kept.
    pub async fn delete(
        &self,
        id: &SubscriptionId,
        tenant_id: &TenantId,
        acting_user: &UserId,
    ) -> Result<bool, QuireError> {
        let Some(existing) = self.repo.get_subscription(tenant_id, id).await? else {
            return Ok(false);
        };
        if !self.repo.delete_subscription(tenant_id, id).await? {
            return Ok(false);
        }

        info!(tenant_id = %tenant_id, subscription_id = %id, "webhook subscription deleted");
        self.audit(
            tenant_id,
            acting_user,
            AuditAction::Delete,
            id,
            json!({ "name": existing.name, "url": existing.url }),
        )
        .await;

        Ok(true)
    }

    /// All of the tenant's subscriptions, newest first.
    pub async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>, QuireError> {
        self.repo.list_subscriptions(tenant_id).await
    }

    pub async fn get(
        &self,
        id: &SubscriptionId,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, QuireError> {
        self.repo.get_subscription(tenant_id, id).await
    }

    fn validate_url(&self, raw: &str) -> Result<String, QuireError> {
        let trimmed = raw.trim();
        validate_webhook_url(trimmed, self.allow_insecure_urls)?;
        Ok(trimmed.to_string())
    }

    fn quota_exceeded(&self) -> QuireError {
        QuireError::Validation(format!(
            "Maximum of {} active webhook subscriptions per tenant reached",
            self.max_active
        ))
    }

    // Audit writes are best effort: the mutation has already been committed.
    async fn audit(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        action: AuditAction,
        id: &SubscriptionId,
        details: serde_json::Value,
    ) {
        let entry = AuditEntry::new(
            tenant_id.clone(),
            user_id.clone(),
            action,
            SUBSCRIPTION_RESOURCE,
            id.as_str(),
            details,
        );
        if let Err(e) = self.audit.record(&entry).await {
            warn!(
                tenant_id = %tenant_id,
                subscription_id = %id,
                action = %action,
                error = %e,
                "failed to write audit entry"
            );
        }
    }
}

fn validate_name(raw: &str) -> Result<String, QuireError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(QuireError::Validation("Name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(QuireError::Validation(format!(
            "Name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_description(raw: Option<String>) -> Result<Option<String>, QuireError> {
    let Some(description) = raw else {
        return Ok(None);
    };
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(QuireError::Validation(format!(
            "Description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok((!description.is_empty()).then(|| description.to_string()))
}

/// Parse event names against the platform enumeration.
///
/// Rejects an empty list and any unknown name; duplicates collapse onto
/// their first occurrence.
pub fn parse_events(raw: &[String]) -> Result<Vec<EventType>, QuireError> {
    if raw.is_empty() {
        return Err(QuireError::Validation(
            "At least one event type is required".into(),
        ));
    }
    let mut events = Vec::with_capacity(raw.len());
    for name in raw {
        let event = EventType::from_str(name.trim())
            .map_err(|_| QuireError::Validation(format!("Unknown event type: {name}")))?;
        if !events.contains(&event) {
            events.push(event);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_security::hash_secret;
    use quire_test_utils::MemoryStore;

    fn store_with(max: usize) -> (SubscriptionStore, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore::new());
        let config = WebhooksConfig {
            max_subscriptions_per_tenant: max,
            ..WebhooksConfig::default()
        };
        let store = SubscriptionStore::new(memory.clone(), memory.clone(), &config);
        (store, memory)
    }

    fn input(events: &[&str]) -> NewSubscription {
        NewSubscription {
            name: "  Warehouse sync ".into(),
            description: Some("Pushes sales to the warehouse".into()),
            url: "https://hooks.example.com/quire".into(),
            events: events.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn tenant() -> TenantId {
        TenantId::from("tenant-a")
    }

    fn user() -> UserId {
        UserId::from("user-1")
    }

    #[tokio::test]
    async fn create_persists_hash_and_returns_secret_once() {
        let (store, memory) = store_with(10);
        let created = store
            .create(&tenant(), input(&["sale.created"]), &user())
            .await
            .unwrap();

        let sub = &created.subscription;
        assert_eq!(sub.name, "Warehouse sync");
        assert!(sub.is_active);
        assert_eq!(created.secret.expose().len(), 64);
        assert_eq!(sub.secret_hash, hash_secret(created.secret.expose()));

        let stored = store.get(&sub.id, &tenant()).await.unwrap().unwrap();
        assert_ne!(stored.secret_hash, created.secret.expose());

        let audit = memory.audit_entries().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Create);
        assert_eq!(audit[0].resource_type, SUBSCRIPTION_RESOURCE);
        assert_eq!(audit[0].resource_id, sub.id.as_str());
    }

    #[tokio::test]
    async fn events_are_validated_and_deduplicated() {
        let (store, _) = store_with(10);
        let created = store
            .create(
                &tenant(),
                input(&["sale.created", "title.updated", "sale.created"]),
                &user(),
            )
            .await
            .unwrap();
        assert_eq!(
            created.subscription.events,
            vec![EventType::SaleCreated, EventType::TitleUpdated]
        );

        let err = store
            .create(&tenant(), input(&["sale.exploded"]), &user())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown event type: sale.exploded");

        let err = store.create(&tenant(), input(&[]), &user()).await.unwrap_err();
        assert!(err.is_validation());

        let err = store.create(&tenant(), input(&["test"]), &user()).await.unwrap_err();
        assert!(err.is_validation(), "probe pseudo-type is not subscribable");
    }

    #[tokio::test]
    async fn unsafe_urls_are_rejected() {
        let (store, memory) = store_with(10);

        let mut plain_http = input(&["sale.created"]);
        plain_http.url = "http://hooks.example.com/quire".into();
        let err = store.create(&tenant(), plain_http, &user()).await.unwrap_err();
        assert!(matches!(err, QuireError::Validation(_)));

        let mut private = input(&["sale.created"]);
        private.url = "https://10.1.2.3/hook".into();
        let err = store.create(&tenant(), private, &user()).await.unwrap_err();
        assert!(matches!(err, QuireError::SsrfBlocked(_)));

        assert!(memory.all_subscriptions().await.is_empty());
        assert!(memory.audit_entries().await.is_empty());
    }

    #[tokio::test]
    async fn insecure_urls_allowed_in_development_mode() {
        let memory = Arc::new(MemoryStore::new());
        let config = WebhooksConfig {
            allow_insecure_urls: true,
            ..WebhooksConfig::default()
        };
        let store = SubscriptionStore::new(memory.clone(), memory, &config);
        let mut plain_http = input(&["sale.created"]);
        plain_http.url = "http://receiver.internal.example:8080/hook".into();
        assert!(store.create(&tenant(), plain_http, &user()).await.is_ok());
    }

    #[tokio::test]
    async fn name_and_description_limits() {
        let (store, _) = store_with(10);

        let mut blank = input(&["sale.created"]);
        blank.name = "   ".into();
        assert_eq!(
            store.create(&tenant(), blank, &user()).await.unwrap_err().to_string(),
            "Name is required"
        );

        let mut long_name = input(&["sale.created"]);
        long_name.name = "n".repeat(MAX_NAME_LEN + 1);
        assert!(store.create(&tenant(), long_name, &user()).await.is_err());

        let mut long_desc = input(&["sale.created"]);
        long_desc.description = Some("d".repeat(MAX_DESCRIPTION_LEN + 1));
        assert!(store.create(&tenant(), long_desc, &user()).await.is_err());

        let mut exact = input(&["sale.created"]);
        exact.name = "n".repeat(MAX_NAME_LEN);
        assert!(store.create(&tenant(), exact, &user()).await.is_ok());
    }

    #[tokio::test]
    async fn quota_applies_to_create_and_reactivation() {
        let (store, _) = store_with(2);
        let first = store
            .create(&tenant(), input(&["sale.created"]), &user())
            .await
            .unwrap();
        store
            .create(&tenant(), input(&["sale.created"]), &user())
            .await
            .unwrap();

        let err = store
            .create(&tenant(), input(&["sale.created"]), &user())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Maximum of 2 active webhook subscriptions per tenant reached"
        );

        // Other tenants have their own allowance.
        assert!(
            store
                .create(&TenantId::from("tenant-b"), input(&["sale.created"]), &user())
                .await
                .is_ok()
        );

        let deactivate = SubscriptionPatch {
            is_active: Some(false),
            ..Default::default()
        };
        let id = first.subscription.id.clone();
        store.update(&id, &tenant(), deactivate, &user()).await.unwrap();
        store
            .create(&tenant(), input(&["sale.created"]), &user())
            .await
            .unwrap();

        let reactivate = SubscriptionPatch {
            is_active: Some(true),
            ..Default::default()
        };
        let err = store.update(&id, &tenant(), reactivate, &user()).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn empty_patch_is_rejected_without_audit() {
        let (store, memory) = store_with(10);
        let created = store
            .create(&tenant(), input(&["sale.created"]), &user())
            .await
            .unwrap();

        let err = store
            .update(
                &created.subscription.id,
                &tenant(),
                SubscriptionPatch::default(),
                &user(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No fields to update");
        assert_eq!(memory.audit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creates_never_exceed_the_cap() {
        let (store, memory) = store_with(3);
        let store = Arc::new(store);
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..12 {
            let store = store.clone();
            tasks.spawn(async move {
                store
                    .create(&tenant(), input(&["sale.created"]), &user())
                    .await
            });
        }
        let mut created = 0;
        while let Some(joined) = tasks.join_next().await {
            if joined.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 3);
        assert_eq!(memory.all_subscriptions().await.len(), 3);
    }

    #[tokio::test]
    async fn update_revalidates_changed_fields() {
        let (store, memory) = store_with(10);
        let created = store
            .create(&tenant(), input(&["sale.created"]), &user())
            .await
            .unwrap();
        let id = created.subscription.id.clone();

        let patch = SubscriptionPatch {
            url: Some("https://169.254.169.254/latest".into()),
            ..Default::default()
        };
        assert!(store.update(&id, &tenant(), patch, &user()).await.is_err());

        let patch = SubscriptionPatch {
            name: Some("Renamed".into()),
            description: Some(None),
            events: Some(vec!["title.created".into(), "title.deleted".into()]),
            ..Default::default()
        };
        let updated = store
            .update(&id, &tenant(), patch, &user())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.description, None);
        assert_eq!(
            updated.events,
            vec![EventType::TitleCreated, EventType::TitleDeleted]
        );
        assert_eq!(updated.url, created.subscription.url);

        let audit = memory.audit_entries().await;
        assert_eq!(audit.last().unwrap().action, AuditAction::Update);
        assert_eq!(
            audit.last().unwrap().details["changes"],
            json!(["name", "description", "events"])
        );
    }

    #[tokio::test]
    async fn other_tenants_see_nothing() {
        let (store, _) = store_with(10);
        let created = store
            .create(&tenant(), input(&["sale.created"]), &user())
            .await
            .unwrap();
        let id = created.subscription.id;
        let intruder = TenantId::from("tenant-b");

        assert!(store.get(&id, &intruder).await.unwrap().is_none());
        assert!(store.list(&intruder).await.unwrap().is_empty());
        let patch = SubscriptionPatch {
            name: Some("Hijacked".into()),
            ..Default::default()
        };
        assert!(store.update(&id, &intruder, patch, &user()).await.unwrap().is_none());
        assert!(store.regenerate_secret(&id, &intruder, &user()).await.unwrap().is_none());
        assert!(!store.delete(&id, &intruder, &user()).await.unwrap());
        assert!(store.get(&id, &tenant()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn regenerate_replaces_hash_and_audits() {
        let (store, memory) = store_with(10);
        let created = store
            .create(&tenant(), input(&["sale.created"]), &user())
            .await
            .unwrap();
        let id = created.subscription.id.clone();

        let fresh = store
            .regenerate_secret(&id, &tenant(), &user())
            .await
            .unwrap()
            .unwrap();
        assert_ne!(fresh.expose(), created.secret.expose());

        let stored = store.get(&id, &tenant()).await.unwrap().unwrap();
        assert_eq!(stored.secret_hash, hash_secret(fresh.expose()));

        let last = memory.audit_entries().await.pop().unwrap();
        assert_eq!(last.action, AuditAction::Update);
        assert_eq!(last.details, json!({"secret_regenerated": true}));
    }

    #[tokio::test]
    async fn delete_is_hard_and_audited() {
        let (store, memory) = store_with(10);
        let created = store
            .create(&tenant(), input(&["sale.created"]), &user())
            .await
            .unwrap();
        let id = created.subscription.id;

        assert!(store.delete(&id, &tenant(), &user()).await.unwrap());
        assert!(store.get(&id, &tenant()).await.unwrap().is_none());
        assert!(!store.delete(&id, &tenant(), &user()).await.unwrap());

        let actions: Vec<_> = memory
            .audit_entries()
            .await
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec![AuditAction::Create, AuditAction::Delete]);
    }
}
