// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Quire webhook engine.
//!
//! Layered TOML files plus `QUIRE_*` environment overrides (Figment), strict
//! `deny_unknown_fields` sections, semantic validation that reports every
//! problem at once, and miette diagnostics pointing into the source file.
//!
//! ```no_run
//! let config = quire_config::load_and_validate().expect("config errors");
//! println!("Workers: {}", config.webhooks.worker_concurrency);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, SourceFiles, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::QuireConfig;

/// Load from the standard locations and validate.
pub fn load_and_validate() -> Result<QuireConfig, Vec<ConfigError>> {
    checked(loader::load_config(), || {
        SourceFiles::read(&loader::standard_paths())
    })
}

/// Load from an explicit file (plus environment overrides) and validate.
pub fn load_and_validate_path(path: &Path) -> Result<QuireConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), || {
        SourceFiles::read(&[path])
    })
}

/// Load from a TOML string and validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<QuireConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        SourceFiles::inline("<inline>", toml_content)
    })
}

/// Sources are only read when extraction failed and a report is needed.
fn checked(
    loaded: Result<QuireConfig, figment::Error>,
    sources: impl FnOnce() -> SourceFiles,
) -> Result<QuireConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|err| diagnostic::from_figment(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}
