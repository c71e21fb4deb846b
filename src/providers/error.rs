//! Provider-surface error type, shared by mail/drive/calendar clients.

use crate::utils::retry::RetryableError;
use reqwest::StatusCode;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// 401 — re-raised so `TokenGuard` can intercept and refresh.
    #[error("unauthorized (token expired or revoked)")]
    Unauthorized,
    #[error("provider http error {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RetryableError for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ProviderError::Transport(e) => e.is_timeout() || e.is_connect(),
            ProviderError::Unauthorized => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

pub fn classify_status(status: StatusCode, body: String) -> ProviderError {
    if status == StatusCode::UNAUTHORIZED {
        ProviderError::Unauthorized
    } else {
        ProviderError::Http { status, body }
    }
}
