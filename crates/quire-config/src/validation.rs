// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid IP addresses, non-empty paths, and positive limits.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::QuireConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Minimum length of the signing master key, in bytes.
pub const MIN_MASTER_KEY_LEN: usize = 32;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &QuireConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        invalid(format!(
            "service.log_level `{}` must be one of: {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    for ip in &config.security.allowed_private_ips {
        if ip.parse::<std::net::IpAddr>().is_err() {
            invalid(format!(
                "security.allowed_private_ips entry `{ip}` is not a valid IP address"
            ));
        }
    }

    let webhooks = &config.webhooks;
    if let Some(key) = &webhooks.signing_master_key
        && key.len() < MIN_MASTER_KEY_LEN
    {
        invalid(format!(
            "webhooks.signing_master_key must be at least {MIN_MASTER_KEY_LEN} bytes"
        ));
    }

    if webhooks.max_subscriptions_per_tenant == 0 {
        invalid("webhooks.max_subscriptions_per_tenant must be at least 1".to_string());
    }

    if !(1..=300).contains(&webhooks.delivery_timeout_secs) {
        invalid(format!(
            "webhooks.delivery_timeout_secs must be between 1 and 300, got {}",
            webhooks.delivery_timeout_secs
        ));
    }

    if webhooks.user_agent.trim().is_empty() {
        invalid("webhooks.user_agent must not be empty".to_string());
    }

    if webhooks.worker_concurrency == 0 {
        invalid("webhooks.worker_concurrency must be at least 1".to_string());
    }

    if webhooks.poll_interval_ms == 0 {
        invalid("webhooks.poll_interval_ms must be greater than 0".to_string());
    }

    let gateway = &config.gateway;
    if gateway.host.trim().is_empty() {
        invalid("gateway.host must not be empty".to_string());
    }

    if gateway.enabled && gateway.api_keys.is_empty() {
        invalid("gateway.enabled requires at least one [[gateway.api_keys]] entry".to_string());
    }

    let mut seen_tokens = HashSet::new();
    for (i, key) in gateway.api_keys.iter().enumerate() {
        if key.token.trim().is_empty() {
            invalid(format!("gateway.api_keys[{i}].token must not be empty"));
        } else if !seen_tokens.insert(key.token.as_str()) {
            invalid(format!("gateway.api_keys[{i}].token duplicates an earlier entry"));
        }
        if key.tenant_id.trim().is_empty() {
            invalid(format!("gateway.api_keys[{i}].tenant_id must not be empty"));
        }
        if key.user_id.trim().is_empty() {
            invalid(format!("gateway.api_keys[{i}].user_id must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ApiKeyConfig;
    use quire_core::Permission;

    fn messages(config: &QuireConfig) -> Vec<String> {
        match validate_config(config) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn api_key(token: &str) -> ApiKeyConfig {
        ApiKeyConfig {
            token: token.to_string(),
            tenant_id: "tenant-a".to_string(),
            user_id: "user-1".to_string(),
            permissions: vec![Permission::WebhooksRead],
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&QuireConfig::default()).is_ok());
    }

    #[test]
    fn short_master_key_rejected() {
        let mut config = QuireConfig::default();
        config.webhooks.signing_master_key = Some("too-short".into());
        let msgs = messages(&config);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("signing_master_key"));
    }

    #[test]
    fn collects_every_error() {
        let mut config = QuireConfig::default();
        config.service.log_level = "verbose".into();
        config.webhooks.worker_concurrency = 0;
        config.webhooks.delivery_timeout_secs = 0;
        config.security.allowed_private_ips = vec!["not-an-ip".into()];
        assert_eq!(messages(&config).len(), 4);
    }

    #[test]
    fn enabled_gateway_needs_keys() {
        let mut config = QuireConfig::default();
        config.gateway.enabled = true;
        assert!(messages(&config)[0].contains("api_keys"));

        config.gateway.api_keys.push(api_key("tok-1"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn duplicate_tokens_rejected() {
        let mut config = QuireConfig::default();
        config.gateway.api_keys = vec![api_key("tok-1"), api_key("tok-1")];
        let msgs = messages(&config);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("api_keys[1]"));
    }
}
