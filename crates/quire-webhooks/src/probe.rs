// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test probe: a synchronous, unrecorded delivery for integration checks.
//!
//! Probe requests are signed with the public [`TestKey`] rather than the
//! subscription's derived key and are marked with `X-Webhook-Test: true`,
//! so a receiver can never mistake one for production traffic.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use quire_core::{QuireError, SubscriptionId, SubscriptionRepository, TenantId};
use quire_security::{TestKey, sign};

use crate::payload::test_payload;
use crate::sender::{SignedRequest, post_signed};

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TestProbe {
    subscriptions: Arc<dyn SubscriptionRepository>,
    client: reqwest::Client,
    timeout: Duration,
}

impl TestProbe {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            subscriptions,
            client,
            timeout,
        }
    }

    /// Send a synthetic `test` event to the subscription's URL and report
    /// what happened. No delivery row is written.
    pub async fn test(
        &self,
        subscription_id: &SubscriptionId,
        tenant_id: &TenantId,
    ) -> Result<ProbeOutcome, QuireError> {
        let subscription = self
            .subscriptions
            .get_subscription(tenant_id, subscription_id)
            .await?
            .ok_or_else(|| QuireError::NotFound("Subscription not found".into()))?;

        let payload = test_payload(&subscription)?;
        let key = TestKey::for_subscription(&subscription.id);
        let timestamp = Utc::now().timestamp();
        let signature = sign(&payload, key.as_bytes(), timestamp);

        let attempt = post_signed(
            &self.client,
            SignedRequest {
                url: &subscription.url,
                payload: &payload,
                timestamp,
                signature,
                test_key: Some(&key),
            },
            self.timeout,
        )
        .await;

        info!(
            tenant_id = %tenant_id,
            subscription_id = %subscription.id,
            success = attempt.succeeded(),
            status_code = ?attempt.status_code,
            duration_ms = attempt.duration_ms,
            "test webhook sent"
        );

        Ok(ProbeOutcome {
            success: attempt.succeeded(),
            status_code: attempt.status_code,
            error: attempt.error,
        })
    }
}
