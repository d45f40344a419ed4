// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use thiserror::Error;

/// Failure of a completion exchange.
///
/// The orchestrator retries `Transient` errors with exponential backoff up
/// to its configured budget; everything else surfaces immediately.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Timeout, rate limit, or server-side error.  `retry_after` carries the
    /// provider-indicated wait when one was sent.
    #[error("transient provider error (status {status:?}): {message}")]
    Transient {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Non-retryable provider rejection (bad request, auth, unknown model).
    #[error("provider error (status {status:?}): {message}")]
    Fatal { status: Option<u16>, message: String },

    /// Missing API key for a provider that requires one.
    #[error("no API key: set {env} for provider '{provider}'")]
    MissingApiKey { provider: String, env: String },

    /// The provider answered but the body did not parse.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
