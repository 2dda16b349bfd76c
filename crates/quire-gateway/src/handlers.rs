// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the management API.
//!
//! Every `/v1` handler receives the authenticated [`Caller`] from the auth
//! middleware and scopes all reads and writes to the caller's tenant. A
//! subscription or delivery owned by another tenant is reported as not found.

use std::str::FromStr;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use quire_core::{
    Delivery, DeliveryFilter, DeliveryId, DeliveryStatus, EventType, HealthStatus, Permission,
    QuireError, Subscription, SubscriptionId, SubscriptionPatch,
};
use quire_webhooks::{NewSubscription, ProbeOutcome};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::server::GatewayState;

/// Default page size for delivery history.
pub const DEFAULT_DELIVERY_LIMIT: usize = 50;
/// Largest page size a caller may request.
pub const MAX_DELIVERY_LIMIT: usize = 200;

type ApiResult<T> = Result<T, ApiError>;

/// Response body for POST /v1/webhooks. The secret is shown only here.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub subscription: Subscription,
    pub secret: String,
}

/// Response body for POST /v1/webhooks/{id}/secret.
#[derive(Debug, Serialize)]
pub struct SecretResponse {
    pub secret: String,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One entry of GET /v1/event-types.
#[derive(Debug, Serialize)]
pub struct EventTypeInfo {
    pub name: &'static str,
}

/// Query string for delivery history.
#[derive(Debug, Default, Deserialize)]
pub struct DeliveryQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

impl DeliveryQuery {
    fn into_filter(self, subscription_id: SubscriptionId) -> Result<DeliveryFilter, QuireError> {
        let status = self
            .status
            .map(|raw| {
                DeliveryStatus::from_str(&raw)
                    .map_err(|_| QuireError::Validation(format!("Unknown delivery status: {raw}")))
            })
            .transpose()?;
        let limit = self
            .limit
            .unwrap_or(DEFAULT_DELIVERY_LIMIT)
            .clamp(1, MAX_DELIVERY_LIMIT);
        Ok(DeliveryFilter {
            subscription_id: Some(subscription_id),
            status,
            limit: Some(limit),
            ..Default::default()
        })
    }
}

fn subscription_not_found() -> ApiError {
    ApiError(QuireError::NotFound("Subscription not found".into()))
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let version = env!("CARGO_PKG_VERSION").to_string();
    let (code, status, storage, detail) = match state.storage.health_check().await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "ok", "healthy", None),
        Ok(HealthStatus::Unhealthy(reason)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "unavailable",
            "unhealthy",
            Some(reason),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "storage health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "unhealthy",
                None,
            )
        }
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            storage: storage.to_string(),
            version,
            detail,
        }),
    )
        .into_response()
}

/// GET /v1/event-types
pub async fn list_event_types(
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<EventTypeInfo>>> {
    caller.require(Permission::WebhooksRead)?;
    Ok(Json(
        EventType::all()
            .into_iter()
            .map(|e| EventTypeInfo { name: e.as_str() })
            .collect(),
    ))
}

/// GET /v1/webhooks
pub async fn list_subscriptions(
    State(state): State<GatewayState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<Subscription>>> {
    caller.require(Permission::WebhooksRead)?;
    let subs = state.engine.store.list(&caller.tenant_id).await?;
    Ok(Json(subs))
}

/// POST /v1/webhooks
pub async fn create_subscription(
    State(state): State<GatewayState>,
    Extension(caller): Extension<Caller>,
    Json(input): Json<NewSubscription>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    caller.require(Permission::WebhooksManage)?;
    let created = state
        .engine
        .store
        .create(&caller.tenant_id, input, &caller.user_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            subscription: created.subscription,
            secret: created.secret.expose().to_string(),
        }),
    ))
}

/// GET /v1/webhooks/{id}
pub async fn get_subscription(
    State(state): State<GatewayState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<Json<Subscription>> {
    caller.require(Permission::WebhooksRead)?;
    state
        .engine
        .store
        .get(&SubscriptionId::from(id), &caller.tenant_id)
        .await?
        .map(Json)
        .ok_or_else(subscription_not_found)
}

/// PATCH /v1/webhooks/{id}
pub async fn update_subscription(
    State(state): State<GatewayState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(patch): Json<SubscriptionPatch>,
) -> ApiResult<Json<Subscription>> {
    caller.require(Permission::WebhooksManage)?;
    state
        .engine
        .store
        .update(
            &SubscriptionId::from(id),
            &caller.tenant_id,
            patch,
            &caller.user_id,
        )
        .await?
        .map(Json)
        .ok_or_else(subscription_not_found)
}

/// DELETE /v1/webhooks/{id}
pub async fn delete_subscription(
    State(state): State<GatewayState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    caller.require(Permission::WebhooksManage)?;
    let deleted = state
        .engine
        .store
        .delete(&SubscriptionId::from(id), &caller.tenant_id, &caller.user_id)
        .await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(subscription_not_found())
    }
}

/// POST /v1/webhooks/{id}/secret
pub async fn regenerate_secret(
    State(state): State<GatewayState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<Json<SecretResponse>> {
    caller.require(Permission::WebhooksManage)?;
    let secret = state
        .engine
        .store
        .regenerate_secret(&SubscriptionId::from(id), &caller.tenant_id, &caller.user_id)
        .await?
        .ok_or_else(subscription_not_found)?;
    Ok(Json(SecretResponse {
        secret: secret.expose().to_string(),
    }))
}

/// POST /v1/webhooks/{id}/test
pub async fn test_subscription(
    State(state): State<GatewayState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProbeOutcome>> {
    caller.require(Permission::WebhooksManage)?;
    let outcome = state
        .engine
        .probe
        .test(&SubscriptionId::from(id), &caller.tenant_id)
        .await?;
    Ok(Json(outcome))
}

/// GET /v1/webhooks/{id}/deliveries
pub async fn list_deliveries(
    State(state): State<GatewayState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Query(query): Query<DeliveryQuery>,
) -> ApiResult<Json<Vec<Delivery>>> {
    caller.require(Permission::WebhooksRead)?;
    let subscription_id = SubscriptionId::from(id);
    // History survives deletion, so a missing subscription is not an error
    // here; tenant scoping happens in the repository.
    let filter = query.into_filter(subscription_id)?;
    let rows = state.engine.deliveries(&caller.tenant_id, &filter).await?;
    Ok(Json(rows))
}

/// GET /v1/deliveries/{id}
pub async fn get_delivery(
    State(state): State<GatewayState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<Json<Delivery>> {
    caller.require(Permission::WebhooksRead)?;
    state
        .engine
        .delivery(&caller.tenant_id, &DeliveryId::from(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(QuireError::NotFound("Delivery not found".into())))
}

/// POST /v1/deliveries/{id}/retry
pub async fn retry_delivery(
    State(state): State<GatewayState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Delivery>)> {
    caller.require(Permission::WebhooksManage)?;
    let delivery = state
        .engine
        .retry
        .retry(&DeliveryId::from(id), &caller.tenant_id, &caller.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_query_defaults_and_clamps() {
        let sub = SubscriptionId::from("sub-1");
        let filter = DeliveryQuery::default().into_filter(sub.clone()).unwrap();
        assert_eq!(filter.limit, Some(DEFAULT_DELIVERY_LIMIT));
        assert_eq!(filter.subscription_id, Some(sub.clone()));
        assert!(filter.status.is_none());

        let filter = DeliveryQuery {
            status: Some("failed".into()),
            limit: Some(10_000),
        }
        .into_filter(sub.clone())
        .unwrap();
        assert_eq!(filter.limit, Some(MAX_DELIVERY_LIMIT));
        assert_eq!(filter.status, Some(DeliveryStatus::Failed));

        let filter = DeliveryQuery {
            status: None,
            limit: Some(0),
        }
        .into_filter(sub)
        .unwrap();
        assert_eq!(filter.limit, Some(1));
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let err = DeliveryQuery {
            status: Some("bounced".into()),
            limit: None,
        }
        .into_filter(SubscriptionId::from("sub-1"))
        .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Unknown delivery status: bounced");
    }
}
