// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Management API server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use quire_config::model::GatewayConfig;
use quire_core::{QuireError, StorageAdapter};
use quire_webhooks::WebhookEngine;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Subscription store, delivery history, retry and probe.
    pub engine: Arc<WebhookEngine>,
    /// Backend probed by `/health`.
    pub storage: Arc<dyn StorageAdapter>,
    /// Token lookup for `/v1` routes.
    pub auth: AuthConfig,
}

/// Build the full application router.
///
/// `/health` is public; every `/v1` route runs behind the bearer-token
/// middleware.
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/v1/webhooks",
            get(handlers::list_subscriptions).post(handlers::create_subscription),
        )
        .route(
            "/v1/webhooks/{id}",
            get(handlers::get_subscription)
                .patch(handlers::update_subscription)
                .delete(handlers::delete_subscription),
        )
        .route("/v1/webhooks/{id}/secret", post(handlers::regenerate_secret))
        .route("/v1/webhooks/{id}/test", post(handlers::test_subscription))
        .route(
            "/v1/webhooks/{id}/deliveries",
            get(handlers::list_deliveries),
        )
        .route("/v1/deliveries/{id}", get(handlers::get_delivery))
        .route("/v1/deliveries/{id}/retry", post(handlers::retry_delivery))
        .route("/v1/event-types", get(handlers::list_event_types))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve until `cancel` fires.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), QuireError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| QuireError::Http {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Management API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| QuireError::Http {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Management API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_test_utils::TestHarness;

    fn state() -> GatewayState {
        let harness = TestHarness::builder().build().unwrap();
        GatewayState {
            engine: harness.engine.clone(),
            storage: harness.memory.clone(),
            auth: AuthConfig::default(),
        }
    }

    #[test]
    fn gateway_state_is_clone() {
        let state = state();
        let cloned = state.clone();
        assert!(Arc::ptr_eq(&state.engine, &cloned.engine));
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = GatewayConfig {
            enabled: true,
            host: "127.0.0.1".into(),
            port,
            api_keys: Vec::new(),
        };
        let err = start_server(&config, state(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to bind gateway"));
    }

    #[tokio::test]
    async fn server_stops_on_cancel() {
        let config = GatewayConfig {
            enabled: true,
            host: "127.0.0.1".into(),
            port: 0,
            api_keys: Vec::new(),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        start_server(&config, state(), cancel).await.unwrap();
    }
}
