// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound security for the Quire webhook engine.
//!
//! Provides subscriber URL validation with SSRF prevention, a DNS resolver
//! that filters private answers at connect time, subscription secrets and
//! HMAC signatures, and the hardened delivery client.

pub mod client;
pub mod signing;
pub mod ssrf;

pub use client::build_delivery_client;
pub use signing::{
    KeyDeriver, SIGNATURE_TOLERANCE_SECS, SigningKey, SubscriptionSecret, TestKey,
    generate_secret, hash_secret, sign, verify, verify_at,
};
pub use ssrf::{SsrfSafeResolver, is_blocked_ip, is_localhost, validate_webhook_url};
