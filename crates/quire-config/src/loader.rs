// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Compiled defaults are overlaid by `/etc/quire/quire.toml`, then
//! `~/.config/quire/quire.toml`, then `./quire.toml`, then `QUIRE_*`
//! environment variables. Missing files are skipped.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::QuireConfig;

/// Top-level sections, used to map `QUIRE_<SECTION>_<KEY>` variables.
const SECTIONS: &[&str] = &["service", "storage", "security", "webhooks", "gateway"];

/// Config file locations, lowest priority first.
pub fn standard_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/quire/quire.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("quire").join("quire.toml"));
    }
    paths.push(PathBuf::from("quire.toml"));
    paths
}

/// Load from the standard locations plus environment overrides.
pub fn load_config() -> Result<QuireConfig, figment::Error> {
    build_figment().extract()
}

/// Load from a TOML string over the defaults. No files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<QuireConfig, figment::Error> {
    defaults().merge(Toml::string(toml_content)).extract()
}

/// Load from one explicit file plus environment overrides.
pub fn load_config_from_path(path: &Path) -> Result<QuireConfig, figment::Error> {
    defaults()
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered Figment, before extraction.
pub fn build_figment() -> Figment {
    standard_paths()
        .into_iter()
        .fold(defaults(), |figment, path| figment.merge(Toml::file(path)))
        .merge(env_provider())
}

fn defaults() -> Figment {
    Figment::new().merge(Serialized::defaults(QuireConfig::default()))
}

/// `QUIRE_WEBHOOKS_SIGNING_MASTER_KEY` -> `webhooks.signing_master_key`.
///
/// Only the first underscore after the section name becomes a dot, since
/// key names themselves contain underscores.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("QUIRE_").map(|key| env_key_to_path(key.as_str()).into())
}

fn env_key_to_path(key: &str) -> String {
    SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| format!("{section}.{rest}"))
        })
        .unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(
            env_key_to_path("webhooks_signing_master_key"),
            "webhooks.signing_master_key"
        );
        assert_eq!(env_key_to_path("gateway_port"), "gateway.port");
        assert_eq!(env_key_to_path("service_log_level"), "service.log_level");
        assert_eq!(env_key_to_path("unrelated"), "unrelated");
    }

    #[test]
    fn local_file_has_highest_file_priority() {
        let paths = standard_paths();
        assert_eq!(paths.first(), Some(&PathBuf::from("/etc/quire/quire.toml")));
        assert_eq!(paths.last(), Some(&PathBuf::from("quire.toml")));
    }
}
