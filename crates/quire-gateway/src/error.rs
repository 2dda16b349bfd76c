// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`QuireError`] to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use quire_core::QuireError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A handler error carrying the underlying [`QuireError`].
#[derive(Debug)]
pub struct ApiError(pub QuireError);

impl From<QuireError> for ApiError {
    fn from(err: QuireError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            QuireError::Validation(_) | QuireError::SsrfBlocked(_) => StatusCode::BAD_REQUEST,
            QuireError::Unauthorized => StatusCode::UNAUTHORIZED,
            QuireError::Forbidden(_) => StatusCode::FORBIDDEN,
            QuireError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
