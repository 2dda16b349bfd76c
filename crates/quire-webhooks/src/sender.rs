// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One signed HTTP POST with a hard deadline.
//!
//! Shared by the delivery worker and the test probe. Nothing here returns an
//! error: every way an attempt can end is folded into an [`AttemptResult`].

use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;

use quire_security::TestKey;
use quire_security::signing::{SIGNATURE_HEADER, TEST_HEADER, TEST_KEY_HEADER, TIMESTAMP_HEADER};

/// A body plus the signature headers to send with it.
pub struct SignedRequest<'a> {
    pub url: &'a str,
    pub payload: &'a str,
    pub timestamp: i64,
    pub signature: String,
    /// Present only for probe requests.
    pub test_key: Option<&'a TestKey>,
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptResult {
    /// Set whenever a response arrived, successful or not.
    pub status_code: Option<u16>,
    /// `None` exactly when the subscriber answered 2xx.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl AttemptResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// POST `request` and classify the result.
///
/// The whole exchange is bounded by `timeout`; reaching it drops the request
/// and reports `Request timed out ({n}s)`.
pub async fn post_signed(
    client: &reqwest::Client,
    request: SignedRequest<'_>,
    timeout: Duration,
) -> AttemptResult {
    let mut builder = client
        .post(request.url)
        .header(CONTENT_TYPE, "application/json")
        .header(TIMESTAMP_HEADER, request.timestamp.to_string())
        .header(SIGNATURE_HEADER, request.signature)
        .body(request.payload.to_string());
    if let Some(key) = request.test_key {
        builder = builder
            .header(TEST_HEADER, "true")
            .header(TEST_KEY_HEADER, key.as_str());
    }

    let started = Instant::now();
    let sent = tokio::time::timeout(timeout, builder.send()).await;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (status_code, error) = match sent {
        Err(_) => (
            None,
            Some(format!("Request timed out ({}s)", timeout.as_secs())),
        ),
        Ok(Err(e)) => (
            e.status().map(|s| s.as_u16()),
            Some(format!("Request failed: {e}")),
        ),
        Ok(Ok(response)) => {
            let status = response.status();
            let error = (!status.is_success()).then(|| {
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown Status")
                )
            });
            (Some(status.as_u16()), error)
        }
    };

    AttemptResult {
        status_code,
        error,
        duration_ms,
    }
}
