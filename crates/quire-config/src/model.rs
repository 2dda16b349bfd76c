// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Quire webhook engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use quire_core::Permission;
use serde::{Deserialize, Serialize};

/// Top-level Quire configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuireConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound network security settings.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Webhook signing and delivery settings.
    #[serde(default)]
    pub webhooks: WebhooksConfig,

    /// Management HTTP API settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "quire".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("quire").join("quire.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("quire.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Outbound network security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Private IP addresses the delivery client may still connect to when a
    /// subscriber hostname resolves to them.
    #[serde(default)]
    pub allowed_private_ips: Vec<String>,
}

/// Webhook signing and delivery configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhooksConfig {
    /// Server-wide master key used to derive per-subscription signing keys.
    /// Required by `quire serve`; usually supplied via
    /// `QUIRE_WEBHOOKS_SIGNING_MASTER_KEY`.
    #[serde(default)]
    pub signing_master_key: Option<String>,

    /// Hard cap on active subscriptions per tenant.
    #[serde(default = "default_max_subscriptions_per_tenant")]
    pub max_subscriptions_per_tenant: usize,

    /// Upper bound on a single delivery attempt, in seconds.
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,

    /// User-Agent header sent with every delivery.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Replay window accepted by `quire verify`, in seconds.
    #[serde(default = "default_signature_tolerance_secs")]
    pub signature_tolerance_secs: u64,

    /// Number of concurrent delivery workers.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Idle wait between queue polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Accept plain-http subscriber URLs (local development only).
    #[serde(default)]
    pub allow_insecure_urls: bool,
}

impl std::fmt::Debug for WebhooksConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhooksConfig")
            .field(
                "signing_master_key",
                &self.signing_master_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "max_subscriptions_per_tenant",
                &self.max_subscriptions_per_tenant,
            )
            .field("delivery_timeout_secs", &self.delivery_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("signature_tolerance_secs", &self.signature_tolerance_secs)
            .field("worker_concurrency", &self.worker_concurrency)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("allow_insecure_urls", &self.allow_insecure_urls)
            .finish()
    }
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            signing_master_key: None,
            max_subscriptions_per_tenant: default_max_subscriptions_per_tenant(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            user_agent: default_user_agent(),
            signature_tolerance_secs: default_signature_tolerance_secs(),
            worker_concurrency: default_worker_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            allow_insecure_urls: false,
        }
    }
}

fn default_max_subscriptions_per_tenant() -> usize {
    10
}

fn default_delivery_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Quire-Webhooks/1.0".to_string()
}

fn default_signature_tolerance_secs() -> u64 {
    300
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Management HTTP API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Serve the management API alongside the workers.
    #[serde(default)]
    pub enabled: bool,

    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer tokens accepted by the API.
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_gateway_host(),
            port: default_gateway_port(),
            api_keys: Vec::new(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3400
}

/// A bearer token bound to one tenant, user, and permission set.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyConfig {
    pub token: String,
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl std::fmt::Debug for ApiKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyConfig")
            .field("token", &"[redacted]")
            .field("tenant_id", &self.tenant_id)
            .field("user_id", &self.user_id)
            .field("permissions", &self.permissions)
            .finish()
    }
}
