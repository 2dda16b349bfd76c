// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant-scoped management HTTP API for the Quire webhook engine.
//!
//! Exposes subscription CRUD, secret regeneration, test probes, delivery
//! history and manual retry over axum, authenticated with bearer tokens that
//! each map to a tenant, an acting user, and a permission set.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::{AuthConfig, Caller};
pub use error::ApiError;
pub use server::{GatewayState, router, start_server};
