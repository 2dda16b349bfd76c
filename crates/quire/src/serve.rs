// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `quire serve` command implementation.
//!
//! Opens SQLite storage, assembles the webhook engine over it, and runs the
//! delivery worker pool against the durable queue. When `[gateway]` is
//! enabled the management API is served alongside. SIGINT/SIGTERM cancel
//! both; in-flight deliveries finish before storage is closed.

use std::sync::Arc;

use quire_config::model::QuireConfig;
use quire_core::{QuireError, StorageAdapter};
use quire_gateway::{AuthConfig, GatewayState};
use quire_storage::SqliteStorage;
use quire_webhooks::{Collaborators, WebhookEngine};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::shutdown;

/// Runs the `quire serve` command until a shutdown signal arrives.
pub async fn run_serve(config: QuireConfig) -> Result<(), QuireError> {
    let cancel = shutdown::install_signal_handler();
    serve_until(config, cancel).await
}

/// Serve until `cancel` fires.
pub async fn serve_until(config: QuireConfig, cancel: CancellationToken) -> Result<(), QuireError> {
    info!(service = %config.service.name, "starting quire serve");

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;

    let engine = match WebhookEngine::new(Collaborators::from_backend(storage.clone()), &config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            close_storage(storage.as_ref()).await;
            return Err(e);
        }
    };

    match storage.queue_backlog().await {
        Ok((ready, in_flight)) => info!(ready, in_flight, "delivery queue opened"),
        Err(e) => warn!(error = %e, "could not read delivery queue backlog"),
    }

    let pool = engine.worker_pool(storage.clone());
    let workers = tokio::spawn(pool.run(cancel.clone()));

    let gateway = if config.gateway.enabled {
        if config.gateway.api_keys.is_empty() {
            warn!("gateway enabled with no api keys; every /v1 request will be rejected");
        }
        let state = GatewayState {
            engine: engine.clone(),
            storage: storage.clone(),
            auth: AuthConfig::from_keys(&config.gateway.api_keys),
        };
        let gateway_config = config.gateway.clone();
        let gateway_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            quire_gateway::start_server(&gateway_config, state, gateway_cancel).await
        }))
    } else {
        info!("management API disabled");
        None
    };

    info!(
        workers = config.webhooks.worker_concurrency,
        "quire is running"
    );

    let mut result = Ok(());
    if let Some(gateway) = gateway {
        match gateway.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "management API failed, shutting down");
                cancel.cancel();
                result = Err(e);
            }
            Err(e) => {
                error!(error = %e, "management API task panicked, shutting down");
                cancel.cancel();
                result = Err(QuireError::Internal(format!("gateway task failed: {e}")));
            }
        }
    }

    if let Err(e) = workers.await {
        error!(error = %e, "worker pool task panicked");
    }
    info!("delivery workers stopped");

    close_storage(storage.as_ref()).await;
    info!("quire serve stopped");
    result
}

async fn close_storage(storage: &SqliteStorage) {
    if let Err(e) = storage.close().await {
        warn!(error = %e, "failed to close storage cleanly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_config::model::StorageConfig;

    fn config(dir: &tempfile::TempDir) -> QuireConfig {
        let mut config = QuireConfig::default();
        config.storage = StorageConfig {
            database_path: dir.path().join("quire.db").to_string_lossy().to_string(),
            wal_mode: true,
        };
        config.webhooks.poll_interval_ms = 10;
        config
    }

    #[tokio::test]
    async fn missing_master_key_fails_before_serving() {
        let dir = tempfile::tempdir().unwrap();
        let err = serve_until(config(&dir), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("signing_master_key is required"));
    }

    #[tokio::test]
    async fn stops_cleanly_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.webhooks.signing_master_key =
            Some("serve-test-master-key-0123456789abcdef".into());

        let cancel = CancellationToken::new();
        let running = tokio::spawn(serve_until(config, cancel.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        running.await.unwrap().unwrap();
        assert!(dir.path().join("quire.db").exists());
    }
}
