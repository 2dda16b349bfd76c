// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Quire webhook engine.

use thiserror::Error;

/// The primary error type used across all Quire components.
///
/// User-facing variants (`Validation`, `SsrfBlocked`, `NotFound`, `Forbidden`)
/// carry the exact message shown to the caller, so their `Display` output is
/// the bare message.
#[derive(Debug, Error)]
pub enum QuireError {
    /// Input failed validation (bad URL, unknown event type, quota exceeded).
    #[error("{0}")]
    Validation(String),

    /// A URL targets a private, link-local, or cloud-metadata destination.
    #[error("{0}")]
    SsrfBlocked(String),

    /// The requested resource does not exist or is not owned by the tenant.
    #[error("{0}")]
    NotFound(String),

    /// No valid credentials were presented.
    #[error("authentication required")]
    Unauthorized,

    /// Credentials are valid but lack the required permission.
    #[error("{0}")]
    Forbidden(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Job queue errors (enqueue failure, malformed job payload).
    #[error("queue error: {0}")]
    Queue(String),

    /// Outbound HTTP errors (client construction, transport failure).
    #[error("http error: {message}")]
    Http {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Configuration errors (missing master key, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QuireError {
    /// Returns true for errors caused by caller input rather than the system.
    ///
    /// SSRF rejections are a specialised validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::SsrfBlocked(_))
    }

    /// Wrap any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_variants_display_bare_message() {
        let err = QuireError::Validation("Can only retry failed deliveries".into());
        assert_eq!(err.to_string(), "Can only retry failed deliveries");

        let err = QuireError::NotFound("Delivery not found".into());
        assert_eq!(err.to_string(), "Delivery not found");
    }

    #[test]
    fn ssrf_counts_as_validation() {
        assert!(QuireError::SsrfBlocked("blocked".into()).is_validation());
        assert!(QuireError::Validation("bad".into()).is_validation());
        assert!(!QuireError::NotFound("missing".into()).is_validation());
        assert!(!QuireError::Unauthorized.is_validation());
    }

    #[test]
    fn storage_wraps_source() {
        let err = QuireError::storage(std::io::Error::other("disk full"));
        assert!(err.to_string().contains("disk full"));
    }
}
