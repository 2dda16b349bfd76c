// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token authentication for the management API.
//!
//! Each configured token maps to one tenant, one acting user, and a set of
//! permissions. The middleware resolves the token to a [`Caller`] and stores
//! it in the request extensions; handlers then check the permission they
//! need. With no tokens configured every request is rejected (fail-closed).

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use quire_config::model::ApiKeyConfig;
use quire_core::{Permission, QuireError, TenantId, UserId};

use crate::error::ApiError;

/// The authenticated principal of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub permissions: Vec<Permission>,
}

impl Caller {
    /// Fail with `Forbidden` unless the caller holds `permission`.
    pub fn require(&self, permission: Permission) -> Result<(), QuireError> {
        if self.permissions.contains(&permission) {
            Ok(())
        } else {
            Err(QuireError::Forbidden(format!(
                "missing permission: {permission}"
            )))
        }
    }
}

/// Token -> caller lookup built from `[[gateway.api_keys]]`.
#[derive(Clone, Default)]
pub struct AuthConfig {
    callers: Arc<HashMap<String, Caller>>,
}

impl AuthConfig {
    pub fn from_keys(keys: &[ApiKeyConfig]) -> Self {
        let callers = keys
            .iter()
            .map(|key| {
                (
                    key.token.clone(),
                    Caller {
                        tenant_id: TenantId::from(key.tenant_id.as_str()),
                        user_id: UserId::from(key.user_id.as_str()),
                        permissions: key.permissions.clone(),
                    },
                )
            })
            .collect();
        Self {
            callers: Arc::new(callers),
        }
    }

    fn resolve(&self, token: &str) -> Option<&Caller> {
        self.callers.get(token)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tokens", &self.callers.len())
            .finish()
    }
}

/// Resolve `Authorization: Bearer <token>` to a [`Caller`].
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    if auth.callers.is_empty() {
        tracing::error!("gateway has no api keys configured -- rejecting request");
        return ApiError::from(QuireError::Unauthorized).into_response();
    }

    let caller = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| auth.resolve(token.trim()))
        .cloned();

    match caller {
        Some(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        None => ApiError::from(QuireError::Unauthorized).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(token: &str, permissions: Vec<Permission>) -> ApiKeyConfig {
        ApiKeyConfig {
            token: token.into(),
            tenant_id: "tenant-a".into(),
            user_id: "user-1".into(),
            permissions,
        }
    }

    #[test]
    fn tokens_resolve_to_callers() {
        let auth = AuthConfig::from_keys(&[key("tok-read", vec![Permission::WebhooksRead])]);
        let caller = auth.resolve("tok-read").unwrap();
        assert_eq!(caller.tenant_id, TenantId::from("tenant-a"));
        assert!(auth.resolve("tok-other").is_none());
    }

    #[test]
    fn require_checks_permission() {
        let caller = Caller {
            tenant_id: TenantId::from("tenant-a"),
            user_id: UserId::from("user-1"),
            permissions: vec![Permission::WebhooksRead],
        };
        assert!(caller.require(Permission::WebhooksRead).is_ok());
        let err = caller.require(Permission::WebhooksManage).unwrap_err();
        assert!(matches!(err, QuireError::Forbidden(_)));
        assert_eq!(err.to_string(), "missing permission: webhooks:manage");
    }

    #[test]
    fn debug_never_prints_tokens() {
        let auth = AuthConfig::from_keys(&[key("super-secret-token", vec![])]);
        let debug = format!("{auth:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("tokens: 1"));
    }
}
