// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Quire configuration system.

use figment::Jail;
use quire_config::diagnostic::ConfigError;
use quire_config::model::QuireConfig;
use quire_config::{load_and_validate_str, load_config_from_path, load_config_from_str};
use quire_core::Permission;

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_quire_config() {
    let toml = r#"
[service]
name = "quire-eu"
log_level = "debug"

[storage]
database_path = "/tmp/quire-test.db"
wal_mode = false

[security]
allowed_private_ips = ["10.1.2.3"]

[webhooks]
signing_master_key = "0123456789abcdef0123456789abcdef"
max_subscriptions_per_tenant = 25
delivery_timeout_secs = 5
user_agent = "Quire-Webhooks/1.0 (staging)"
signature_tolerance_secs = 120
worker_concurrency = 8
poll_interval_ms = 250
allow_insecure_urls = true

[gateway]
enabled = true
host = "0.0.0.0"
port = 8080

[[gateway.api_keys]]
token = "tok-admin"
tenant_id = "tenant-a"
user_id = "user-1"
permissions = ["webhooks:read", "webhooks:manage"]
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.name, "quire-eu");
    assert_eq!(config.service.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/quire-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.security.allowed_private_ips, vec!["10.1.2.3"]);
    assert_eq!(config.webhooks.max_subscriptions_per_tenant, 25);
    assert_eq!(config.webhooks.delivery_timeout_secs, 5);
    assert_eq!(config.webhooks.signature_tolerance_secs, 120);
    assert_eq!(config.webhooks.worker_concurrency, 8);
    assert_eq!(config.webhooks.poll_interval_ms, 250);
    assert!(config.webhooks.allow_insecure_urls);
    assert!(config.gateway.enabled);
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.gateway.api_keys.len(), 1);
    assert_eq!(
        config.gateway.api_keys[0].permissions,
        vec![Permission::WebhooksRead, Permission::WebhooksManage]
    );
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty config should load");
    assert_eq!(config.service.name, "quire");
    assert_eq!(config.service.log_level, "info");
    assert!(config.storage.wal_mode);
    assert!(config.webhooks.signing_master_key.is_none());
    assert_eq!(config.webhooks.max_subscriptions_per_tenant, 10);
    assert_eq!(config.webhooks.delivery_timeout_secs, 10);
    assert_eq!(config.webhooks.user_agent, "Quire-Webhooks/1.0");
    assert_eq!(config.webhooks.signature_tolerance_secs, 300);
    assert_eq!(config.webhooks.worker_concurrency, 4);
    assert!(!config.webhooks.allow_insecure_urls);
    assert!(!config.gateway.enabled);
    assert!(config.gateway.api_keys.is_empty());
}

#[test]
fn unknown_field_in_webhooks_produces_error() {
    let toml = r#"
[webhooks]
user_agnet = "x"
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("user_agnet"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

#[test]
fn deny_unknown_fields_at_top_level() {
    let err = load_config_from_str("[telemetry]\nenabled = true\n")
        .expect_err("unknown section should be rejected");
    assert!(format!("{err}").contains("telemetry"));
}

#[test]
fn diagnostic_suggests_close_key() {
    let toml = r#"
[webhooks]
worker_concurency = 2
"#;

    let errors = load_and_validate_str(toml).expect_err("typo should fail");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            valid_keys,
            ..
        } => {
            assert_eq!(key, "worker_concurency");
            assert_eq!(suggestion.as_deref(), Some("worker_concurrency"));
            assert!(valid_keys.contains("poll_interval_ms"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[gateway]
port = "eighty"
"#;

    let errors = load_and_validate_str(toml).expect_err("wrong type should fail");
    assert!(matches!(errors[0], ConfigError::InvalidType { .. }));
    assert!(errors[0].to_string().contains("gateway.port"));
}

#[test]
fn unknown_permission_is_rejected() {
    let toml = r#"
[[gateway.api_keys]]
token = "t"
tenant_id = "tenant-a"
user_id = "user-1"
permissions = ["webhooks:admin"]
"#;
    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn load_and_validate_runs_semantic_checks() {
    let toml = r#"
[webhooks]
signing_master_key = "short"
worker_concurrency = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert_eq!(errors.len(), 2);
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}

#[test]
fn debug_output_redacts_secrets() {
    let toml = r#"
[webhooks]
signing_master_key = "super-secret-master-key-material!!"

[[gateway.api_keys]]
token = "bearer-token-value"
tenant_id = "tenant-a"
user_id = "user-1"
"#;

    let config = load_config_from_str(toml).unwrap();
    let debug = format!("{config:?}");
    assert!(!debug.contains("super-secret-master-key-material"));
    assert!(!debug.contains("bearer-token-value"));
    assert!(debug.contains("[redacted]"));
}

#[test]
fn env_vars_override_file_values() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "quire.toml",
            r#"
[webhooks]
worker_concurrency = 2
"#,
        )?;
        jail.set_env(
            "QUIRE_WEBHOOKS_SIGNING_MASTER_KEY",
            "env-master-key-env-master-key-env-master",
        );
        jail.set_env("QUIRE_WEBHOOKS_WORKER_CONCURRENCY", "6");
        jail.set_env("QUIRE_GATEWAY_PORT", "9999");

        let config: QuireConfig =
            load_config_from_path(std::path::Path::new("quire.toml")).map_err(|e| e.to_string())?;
        assert_eq!(
            config.webhooks.signing_master_key.as_deref(),
            Some("env-master-key-env-master-key-env-master")
        );
        assert_eq!(config.webhooks.worker_concurrency, 6);
        assert_eq!(config.gateway.port, 9999);
        Ok(())
    });
}

#[test]
fn missing_config_file_is_skipped() {
    Jail::expect_with(|_jail| {
        let config = load_config_from_path(std::path::Path::new("absent.toml"))
            .map_err(|e| e.to_string())?;
        assert_eq!(config.service.name, "quire");
        Ok(())
    });
}

#[test]
fn unknown_key_points_into_inline_source() {
    let toml = "[service]\nname = \"quire\"\n\n[gateway]\nprot = 8080\n";
    let errors = load_and_validate_str(toml).expect_err("typo should fail");
    match &errors[0] {
        ConfigError::UnknownKey {
            section,
            suggestion,
            span,
            src,
            ..
        } => {
            assert_eq!(section, "gateway");
            assert_eq!(suggestion.as_deref(), Some("port"));
            let span = span.expect("span should be located");
            assert_eq!(&toml[span.offset()..span.offset() + span.len()], "prot");
            assert!(src.is_some());
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn misspelled_permission_gets_a_suggestion() {
    let toml = r#"
[[gateway.api_keys]]
token = "t"
tenant_id = "tenant-a"
user_id = "user-1"
permissions = ["webhooks:raed"]
"#;
    let errors = load_and_validate_str(toml).expect_err("bad permission should fail");
    match &errors[0] {
        ConfigError::UnknownValue {
            value, suggestion, ..
        } => {
            assert_eq!(value, "webhooks:raed");
            assert_eq!(suggestion.as_deref(), Some("webhooks:read"));
        }
        other => panic!("expected UnknownValue, got {other:?}"),
    }
}
