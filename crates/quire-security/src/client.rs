// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hardened outbound HTTP client for webhook deliveries.

use std::sync::Arc;

use quire_config::model::{SecurityConfig, WebhooksConfig};
use quire_core::QuireError;
use tracing::error;

use crate::ssrf::SsrfSafeResolver;

/// Build the reqwest client used for deliveries and test probes.
///
/// - Minimum TLS 1.2.
/// - SSRF-safe DNS resolver honoring `security.allowed_private_ips`.
/// - Redirects are never followed; a 3xx counts as a failed delivery.
/// - The configured User-Agent on every request.
///
/// The per-attempt deadline is enforced by the caller, not by the client.
pub fn build_delivery_client(
    security: &SecurityConfig,
    webhooks: &WebhooksConfig,
) -> Result<reqwest::Client, QuireError> {
    let resolver = SsrfSafeResolver::new(&security.allowed_private_ips);

    reqwest::Client::builder()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .dns_resolver(Arc::new(resolver))
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(webhooks.user_agent.clone())
        .build()
        .map_err(|e| {
            error!("failed to build delivery HTTP client: {e}");
            QuireError::Http {
                message: format!("failed to build delivery HTTP client: {e}"),
                source: Some(Box::new(e)),
            }
        })
}
