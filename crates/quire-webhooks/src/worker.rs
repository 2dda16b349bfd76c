// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery worker: executes one `webhook/deliver` job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use quire_core::{
    DeliveryJob, DeliveryOutcome, DeliveryRepository, DeliveryStatus, QuireError,
    SubscriptionRepository,
};
use quire_security::{KeyDeriver, sign};

use crate::sender::{SignedRequest, post_signed};

/// Signs and POSTs a single delivery, then records the outcome.
pub struct DeliveryWorker {
    subscriptions: Arc<dyn SubscriptionRepository>,
    deliveries: Arc<dyn DeliveryRepository>,
    client: reqwest::Client,
    keys: KeyDeriver,
    timeout: Duration,
}

impl DeliveryWorker {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        deliveries: Arc<dyn DeliveryRepository>,
        client: reqwest::Client,
        keys: KeyDeriver,
        timeout: Duration,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            client,
            keys,
            timeout,
        }
    }

    /// Attempt the delivery described by `job`.
    ///
    /// Returns the recorded outcome, or `None` when the job was skipped
    /// because its row is gone or already terminal. Subscriber-side problems
    /// (timeouts, transport errors, non-2xx) are recorded on the row and are
    /// not errors; only storage failures are returned.
    pub async fn process(&self, job: &DeliveryJob) -> Result<Option<DeliveryOutcome>, QuireError> {
        let Some(delivery) = self
            .deliveries
            .get_delivery(&job.tenant_id, &job.delivery_id)
            .await?
        else {
            warn!(
                tenant_id = %job.tenant_id,
                delivery_id = %job.delivery_id,
                "delivery row missing, dropping job"
            );
            return Ok(None);
        };
        if delivery.status.is_terminal() {
            debug!(
                delivery_id = %job.delivery_id,
                status = %delivery.status,
                "delivery already settled, skipping duplicate job"
            );
            return Ok(None);
        }

        let timestamp = Utc::now().timestamp();
        let key = self.keys.derive(&job.subscription_id);
        let signature = sign(&job.payload, key.as_bytes(), timestamp);
        let attempt = post_signed(
            &self.client,
            SignedRequest {
                url: &job.url,
                payload: &job.payload,
                timestamp,
                signature,
                test_key: None,
            },
            self.timeout,
        )
        .await;

        let outcome = DeliveryOutcome {
            status: if attempt.succeeded() {
                DeliveryStatus::Delivered
            } else {
                DeliveryStatus::Failed
            },
            response_status_code: attempt.status_code,
            error_message: attempt.error,
            duration_ms: attempt.duration_ms,
            completed_at: Utc::now(),
        };

        if !self
            .deliveries
            .complete_delivery(&job.tenant_id, &job.delivery_id, &outcome)
            .await?
        {
            debug!(
                delivery_id = %job.delivery_id,
                "delivery settled by a concurrent attempt, discarding outcome"
            );
            return Ok(None);
        }

        // The row is terminal now; a health-update failure must not requeue it.
        if let Err(e) = self
            .subscriptions
            .record_delivery_result(
                &job.tenant_id,
                &job.subscription_id,
                outcome.status,
                outcome.completed_at,
            )
            .await
        {
            warn!(
                subscription_id = %job.subscription_id,
                error = %e,
                "failed to update subscription health"
            );
        }

        match &outcome.error_message {
            None => info!(
                tenant_id = %job.tenant_id,
                delivery_id = %job.delivery_id,
                subscription_id = %job.subscription_id,
                event_id = %job.event_id,
                status_code = ?outcome.response_status_code,
                duration_ms = outcome.duration_ms,
                "webhook delivered"
            ),
            Some(reason) => warn!(
                tenant_id = %job.tenant_id,
                delivery_id = %job.delivery_id,
                subscription_id = %job.subscription_id,
                event_id = %job.event_id,
                status_code = ?outcome.response_status_code,
                duration_ms = outcome.duration_ms,
                reason = %reason,
                "webhook delivery failed"
            ),
        }

        Ok(Some(outcome))
    }

    /// Settle the row of a job the queue has given up on as `failed`, so
    /// the delivery becomes retryable. Returns false if the row was no
    /// longer pending.
    pub async fn abandon(&self, job: &DeliveryJob, cause: &QuireError) -> Result<bool, QuireError> {
        let outcome = DeliveryOutcome::unsent(format!(
            "Delivery abandoned after repeated processing failures: {cause}"
        ));
        self.deliveries
            .complete_delivery(&job.tenant_id, &job.delivery_id, &outcome)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_core::{Delivery, EventType, Subscription, SubscriptionId, TenantId, UserId};
    use quire_security::{SIGNATURE_TOLERANCE_SECS, verify};
    use quire_test_utils::MemoryStore;
    use secrecy::SecretString;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MASTER: &str = "worker-tests-master-key-0123456789abcdef";

    fn keys() -> KeyDeriver {
        KeyDeriver::new(&SecretString::from(MASTER.to_string())).unwrap()
    }

    fn worker(memory: &Arc<MemoryStore>, timeout: Duration) -> DeliveryWorker {
        DeliveryWorker::new(
            memory.clone(),
            memory.clone(),
            reqwest::Client::new(),
            keys(),
            timeout,
        )
    }

    async fn seed(memory: &MemoryStore, url: &str) -> (Subscription, DeliveryJob) {
        let now = Utc::now();
        let sub = Subscription {
            id: SubscriptionId::generate(),
            tenant_id: TenantId::from("tenant-a"),
            name: "hook".into(),
            description: None,
            url: url.to_string(),
            events: vec![EventType::ReturnApproved],
            is_active: true,
            secret_hash: "hash".into(),
            last_delivery_at: None,
            last_delivery_status: None,
            consecutive_failures: 0,
            created_by: UserId::from("user-1"),
            created_at: now,
            updated_at: now,
        };
        memory.insert_subscription(&sub, usize::MAX).await.unwrap();

        let delivery = Delivery::pending(
            sub.tenant_id.clone(),
            sub.id.clone(),
            "evt-1".into(),
            EventType::ReturnApproved,
            r#"{"id":"evt-1","type":"return.approved","created_at":"2026-01-01T00:00:00.000Z","data":{}}"#
                .into(),
        );
        memory.insert_delivery(&delivery).await.unwrap();
        let job = DeliveryJob::for_delivery(&delivery, url);
        (sub, job)
    }

    async fn row(memory: &MemoryStore, job: &DeliveryJob) -> Delivery {
        memory
            .get_delivery(&job.tenant_id, &job.delivery_id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn health(memory: &MemoryStore, sub: &Subscription) -> Subscription {
        memory
            .get_subscription(&sub.tenant_id, &sub.id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn success_marks_delivered_with_verifiable_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let memory = Arc::new(MemoryStore::new());
        let (sub, job) = seed(&memory, &format!("{}/hook", server.uri())).await;
        let outcome = worker(&memory, Duration::from_secs(5))
            .process(&job)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.succeeded());

        let delivered = row(&memory, &job).await;
        assert_eq!(delivered.status, DeliveryStatus::Delivered);
        assert_eq!(delivered.response_status_code, Some(200));
        assert_eq!(delivered.attempt_count, 1);
        assert!(delivered.delivered_at.is_some());
        assert!(delivered.error_message.is_none());

        let requests = server.received_requests().await.unwrap();
        let received = &requests[0];
        let body = std::str::from_utf8(&received.body).unwrap();
        assert_eq!(body, job.payload);
        let signature = received
            .headers
            .get("x-webhook-signature")
            .unwrap()
            .to_str()
            .unwrap();
        let key = keys().derive(&job.subscription_id);
        assert!(verify(body, signature, key.as_bytes(), SIGNATURE_TOLERANCE_SECS));

        let sub = health(&memory, &sub).await;
        assert_eq!(sub.last_delivery_status, Some(DeliveryStatus::Delivered));
        assert_eq!(sub.consecutive_failures, 0);
        assert!(sub.last_delivery_at.is_some());
    }

    #[tokio::test]
    async fn error_status_marks_failed_and_counts_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let memory = Arc::new(MemoryStore::new());
        let (sub, job) = seed(&memory, &server.uri()).await;
        worker(&memory, Duration::from_secs(5))
            .process(&job)
            .await
            .unwrap();

        let failed = row(&memory, &job).await;
        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert_eq!(failed.response_status_code, Some(500));
        assert_eq!(
            failed.error_message.as_deref(),
            Some("HTTP 500: Internal Server Error")
        );
        assert!(failed.delivered_at.is_none());
        assert_eq!(health(&memory, &sub).await.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn redirect_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "http://10.0.0.1/steal"),
            )
            .mount(&server)
            .await;

        let memory = Arc::new(MemoryStore::new());
        let (_, job) = seed(&memory, &server.uri()).await;
        let client = quire_security::build_delivery_client(
            &Default::default(),
            &Default::default(),
        )
        .unwrap();
        let worker = DeliveryWorker::new(
            memory.clone(),
            memory.clone(),
            client,
            keys(),
            Duration::from_secs(5),
        );
        worker.process(&job).await.unwrap();

        let failed = row(&memory, &job).await;
        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert_eq!(failed.response_status_code, Some(302));
    }

    #[tokio::test]
    async fn timeout_is_recorded_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let memory = Arc::new(MemoryStore::new());
        let (sub, job) = seed(&memory, &server.uri()).await;
        worker(&memory, Duration::from_secs(1))
            .process(&job)
            .await
            .unwrap();

        let failed = row(&memory, &job).await;
        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("Request timed out (1s)"));
        assert_eq!(failed.response_status_code, None);
        assert_eq!(health(&memory, &sub).await.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn duplicate_job_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let memory = Arc::new(MemoryStore::new());
        let (_, job) = seed(&memory, &server.uri()).await;
        let worker = worker(&memory, Duration::from_secs(5));

        assert!(worker.process(&job).await.unwrap().is_some());
        assert!(worker.process(&job).await.unwrap().is_none());
        assert_eq!(row(&memory, &job).await.attempt_count, 1);
    }

    #[tokio::test]
    async fn missing_row_is_skipped() {
        let memory = Arc::new(MemoryStore::new());
        let (_, mut job) = seed(&memory, "https://hooks.example.com/in").await;
        job.delivery_id = "does-not-exist".into();
        assert!(
            worker(&memory, Duration::from_secs(5))
                .process(&job)
                .await
                .unwrap()
                .is_none()
        );
    }
}
