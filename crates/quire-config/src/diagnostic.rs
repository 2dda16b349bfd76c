// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Turns Figment extraction failures into [`ConfigError`]s that miette can
//! render against the offending TOML file, with a "did you mean" hint for
//! misspelled keys and enum values (Jaro-Winkler similarity via `strsim`).

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use std::path::Path;

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Similarity a candidate must exceed to be offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A configuration problem, renderable as a miette report.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`{}", in_section(.section))]
    #[diagnostic(
        code(quire::config::unknown_key),
        help("{}", hint(suggestion.as_deref(), "valid keys", valid_keys))
    )]
    UnknownKey {
        key: String,
        section: String,
        suggestion: Option<String>,
        /// Comma-separated keys accepted in this section.
        valid_keys: String,
        #[label("not a recognised key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("unknown value `{value}` for `{key}`")]
    #[diagnostic(
        code(quire::config::unknown_value),
        help("{}", hint(suggestion.as_deref(), "expected one of", expected))
    )]
    UnknownValue {
        key: String,
        value: String,
        suggestion: Option<String>,
        expected: String,
    },

    #[error("invalid value for `{key}`: found {found}, expected {expected}")]
    #[diagnostic(code(quire::config::invalid_type))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(quire::config::missing_key),
        help("set `{key}` in quire.toml or through its QUIRE_* variable")
    )]
    MissingKey { key: String },

    /// A value deserialized but breaks a semantic rule.
    #[error("validation error: {message}")]
    #[diagnostic(code(quire::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(quire::config::other))]
    Other(String),
}

fn in_section(section: &str) -> String {
    if section.is_empty() {
        String::new()
    } else {
        format!(" in [{section}]")
    }
}

fn hint(suggestion: Option<&str>, label: &str, options: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? {label}: {options}"),
        None => format!("{label}: {options}"),
    }
}

/// TOML text that fed a load, kept so reports can quote it.
#[derive(Debug, Default)]
pub struct SourceFiles {
    files: Vec<(String, String)>,
}

impl SourceFiles {
    /// Read every file in `paths` that exists.
    pub fn read(paths: &[impl AsRef<Path>]) -> Self {
        let files = paths
            .iter()
            .filter_map(|path| {
                let path = path.as_ref();
                let content = std::fs::read_to_string(path).ok()?;
                Some((path.display().to_string(), content))
            })
            .collect();
        Self { files }
    }

    /// A single in-memory source.
    pub fn inline(name: &str, content: &str) -> Self {
        Self {
            files: vec![(name.to_string(), content.to_string())],
        }
    }

    /// The source an error came from. Falls back to the only source when
    /// Figment did not record a file (string providers).
    fn lookup(&self, error: &figment::Error) -> Option<(&str, &str)> {
        let from_metadata = error
            .metadata
            .as_ref()
            .and_then(|m| m.source.as_ref())
            .and_then(|source| match source {
                figment::Source::File(path) => Some(path.as_path()),
                _ => None,
            })
            .and_then(|path| {
                self.files.iter().find(|(name, _)| {
                    Path::new(name) == path || path.ends_with(Path::new(name))
                })
            });
        let entry = match from_metadata {
            Some(entry) => Some(entry),
            None if self.files.len() == 1 => self.files.first(),
            None => None,
        };
        entry.map(|(name, content)| (name.as_str(), content.as_str()))
    }

    fn locate(
        &self,
        error: &figment::Error,
        section: &str,
        key: &str,
    ) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
        let Some((name, content)) = self.lookup(error) else {
            return (None, None);
        };
        match find_key_offset(content, section, key) {
            Some(offset) => (
                Some(SourceSpan::new(offset.into(), key.len())),
                Some(NamedSource::new(name, content.to_string())),
            ),
            None => (None, None),
        }
    }
}

/// Convert every error inside a Figment failure.
pub fn from_figment(err: figment::Error, sources: &SourceFiles) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| convert(&error, sources))
        .collect()
}

fn convert(error: &figment::Error, sources: &SourceFiles) -> ConfigError {
    // Array indices in the path say nothing about the TOML section name.
    let path: Vec<&str> = error
        .path
        .iter()
        .map(String::as_str)
        .filter(|segment| segment.parse::<usize>().is_err())
        .collect();

    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let section = path.join(".");
            let (span, src) = sources.locate(error, &section, field);
            ConfigError::UnknownKey {
                key: field.clone(),
                suggestion: suggest(field, expected),
                valid_keys: expected.join(", "),
                section,
                span,
                src,
            }
        }
        Kind::UnknownVariant(value, expected) => ConfigError::UnknownValue {
            key: path.join("."),
            value: value.clone(),
            suggestion: suggest(value, expected),
            expected: expected.join(", "),
        },
        Kind::InvalidType(found, expected) | Kind::InvalidValue(found, expected) => {
            let (section, key) = match path.split_last() {
                Some((key, parent)) => (parent.join("."), *key),
                None => (String::new(), ""),
            };
            let (span, src) = if key.is_empty() {
                (None, None)
            } else {
                sources.locate(error, &section, key)
            };
            ConfigError::InvalidType {
                key: path.join("."),
                found: found.to_string(),
                expected: expected.clone(),
                span,
                src,
            }
        }
        Kind::MissingField(field) => {
            let mut key = path.join(".");
            if !key.is_empty() {
                key.push('.');
            }
            key.push_str(field);
            ConfigError::MissingKey { key }
        }
        _ => ConfigError::Other(error.to_string()),
    }
}

/// Byte offset of `key` inside `[section]` (or `[[section]]`). An empty
/// section means top-level keys before any header.
pub fn find_key_offset(content: &str, section: &str, key: &str) -> Option<usize> {
    let mut current = "";
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix('[') {
            current = header
                .trim_start_matches('[')
                .split(']')
                .next()
                .unwrap_or("")
                .trim();
        } else if current == section
            && let Some(rest) = trimmed.strip_prefix(key)
            && rest.trim_start().starts_with('=')
        {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

/// Closest candidate to `unknown`, if any is similar enough.
pub fn suggest(unknown: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|candidate| (strsim::jaro_winkler(unknown, candidate), *candidate))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}

/// Print every error to stderr as a graphical miette report.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut report = String::new();
        match handler.render_report(&mut report, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{report}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
    if errors.len() > 1 {
        eprintln!("{} configuration errors", errors.len());
    }
}
