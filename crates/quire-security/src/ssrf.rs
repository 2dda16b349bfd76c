// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSRF defenses for subscriber endpoints.
//!
//! Two layers: [`validate_webhook_url`] checks a candidate URL when a
//! subscription is created or edited, and [`SsrfSafeResolver`] filters DNS
//! answers at connect time so a hostname cannot be re-pointed at a private
//! network after registration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use quire_core::QuireError;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::{error, info};
use url::{Host, Url};

/// Hostnames of cloud instance-metadata services.
const METADATA_HOSTS: &[&str] = &["metadata.google.internal", "metadata"];

/// Metadata endpoints outside the link-local block.
const METADATA_IPS: &[Ipv4Addr] = &[Ipv4Addr::new(100, 100, 100, 200)];

/// Custom DNS resolver that blocks private/reserved IP addresses.
///
/// When a hostname resolves to a private IP, the connection is blocked
/// unless that IP is in the configured allowlist. Loopback answers are
/// accepted, matching [`validate_webhook_url`].
pub struct SsrfSafeResolver {
    allowed_private_ips: Vec<IpAddr>,
}

impl SsrfSafeResolver {
    /// Create a new resolver with the given private IP allowlist.
    pub fn new(allowed: &[String]) -> Self {
        let allowed_ips = allowed
            .iter()
            .filter_map(|s| s.parse::<IpAddr>().ok())
            .collect();
        Self {
            allowed_private_ips: allowed_ips,
        }
    }
}

impl Resolve for SsrfSafeResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let allowed = self.allowed_private_ips.clone();
        let hostname = name.as_str().to_string();

        Box::pin(async move {
            let host = format!("{hostname}:0");
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&host)
                .await
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })?
                .collect();

            let filtered: Vec<SocketAddr> = addrs
                .into_iter()
                .filter(|addr| {
                    let ip = addr.ip();
                    if !is_blocked_ip(&ip) {
                        return true;
                    }
                    if allowed.contains(&ip) {
                        info!(ip = %ip, host = %hostname, "allowing configured private IP");
                        true
                    } else {
                        error!(ip = %ip, host = %hostname, "SSRF blocked: resolved to private IP");
                        false
                    }
                })
                .collect();

            if filtered.is_empty() {
                let err: Box<dyn std::error::Error + Send + Sync> =
                    format!("SSRF blocked: {hostname} resolves only to private IPs").into();
                return Err(err);
            }

            let addrs: Addrs = Box::new(filtered.into_iter());
            Ok(addrs)
        })
    }
}

/// Whether an address is a private, link-local, or metadata destination.
///
/// Loopback is not blocked: local receivers are a supported development
/// setup.
pub fn is_blocked_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || METADATA_IPS.contains(v4)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_blocked_ip(&IpAddr::V4(mapped));
            }
            v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7 unique local
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10 link-local
        }
    }
}

/// Check if a URL host refers to this machine.
pub fn is_localhost(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "::1" | "localhost" | "[::1]")
}

/// Validate a candidate subscriber URL.
///
/// Rules, applied in order:
/// 1. the URL parses and its scheme is `http` or `https`;
/// 2. the host is not a private IPv4 block, a link-local or unique-local
///    address, or a cloud metadata host ([`QuireError::SsrfBlocked`]);
/// 3. loopback hosts are exempt from rule 2 and from the TLS rule;
/// 4. outside `test_mode`, every other host must use `https`.
///
/// Hostnames are not resolved here; [`SsrfSafeResolver`] covers them at
/// connect time.
pub fn validate_webhook_url(raw: &str, test_mode: bool) -> Result<Url, QuireError> {
    let parsed = Url::parse(raw)
        .map_err(|e| QuireError::Validation(format!("Invalid URL: {e}")))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(QuireError::Validation(format!(
            "URL must use http or https, got {scheme}"
        )));
    }

    let loopback = match parsed.host() {
        None => return Err(QuireError::Validation("URL must have a host".to_string())),
        Some(Host::Domain(domain)) => {
            let lower = domain.to_ascii_lowercase();
            if METADATA_HOSTS.contains(&lower.as_str()) {
                error!(url = %raw, "SSRF blocked: URL targets metadata host");
                return Err(QuireError::SsrfBlocked(format!(
                    "URL targets a cloud metadata host ({lower})"
                )));
            }
            is_localhost(&lower)
        }
        Some(Host::Ipv4(v4)) => check_ip(IpAddr::V4(v4), raw)?,
        Some(Host::Ipv6(v6)) => check_ip(IpAddr::V6(v6), raw)?,
    };

    if !test_mode && !loopback && scheme != "https" {
        return Err(QuireError::Validation("URL must use HTTPS".to_string()));
    }

    Ok(parsed)
}

/// Returns whether the address is loopback, or the SSRF error for a blocked one.
fn check_ip(ip: IpAddr, raw: &str) -> Result<bool, QuireError> {
    if ip.is_loopback() {
        return Ok(true);
    }
    if is_blocked_ip(&ip) {
        error!(ip = %ip, url = %raw, "SSRF blocked: URL targets private IP");
        return Err(QuireError::SsrfBlocked(format!(
            "URL targets a private or reserved address ({ip})"
        )));
    }
    Ok(false)
}
