//! Typed error taxonomy for the prep pipeline's fallible boundaries.
//!
//! Internal call sites thread `anyhow::Result` through; `PrepError` exists at
//! stage/API boundaries where a caller needs to branch on *kind*, not just
//! display a message.

use serde::Serialize;

/// Discriminant used on the wire and in logs. Mirrors the error kinds in
/// spec §7 exactly — do not add variants without a corresponding spec entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RevokedToken,
    TransientProvider,
    LlmRateLimit,
    LlmParseFailure,
    NoValidAccounts,
    ClassificationNonMeeting,
    Cancelled,
    Internal,
}

impl ErrorCode {
    /// HTTP status a wire-facing error of this kind should report.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::RevokedToken | ErrorCode::NoValidAccounts => 401,
            ErrorCode::LlmRateLimit | ErrorCode::TransientProvider => 503,
            ErrorCode::Cancelled => 499,
            ErrorCode::ClassificationNonMeeting => 200,
            ErrorCode::LlmParseFailure | ErrorCode::Internal => 500,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    #[error("account {account_id} token revoked")]
    RevokedToken { account_id: String },

    #[error("provider call failed after retries: {0}")]
    TransientProvider(String),

    #[error("llm rate limited and retries exhausted")]
    LlmRateLimit,

    #[error("llm output could not be parsed: {0}")]
    LlmParseFailure(String),

    #[error("no valid (non-revoked) accounts for user {user_id}")]
    NoValidAccounts { user_id: String },

    #[error("event is not a meeting requiring prep: {reason}")]
    ClassificationNonMeeting { reason: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PrepError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PrepError::RevokedToken { .. } => ErrorCode::RevokedToken,
            PrepError::TransientProvider(_) => ErrorCode::TransientProvider,
            PrepError::LlmRateLimit => ErrorCode::LlmRateLimit,
            PrepError::LlmParseFailure(_) => ErrorCode::LlmParseFailure,
            PrepError::NoValidAccounts { .. } => ErrorCode::NoValidAccounts,
            PrepError::ClassificationNonMeeting { .. } => ErrorCode::ClassificationNonMeeting,
            PrepError::Cancelled => ErrorCode::Cancelled,
            PrepError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error terminal-revokes the account (never retry).
    pub fn is_revoked(&self) -> bool {
        matches!(
            self,
            PrepError::RevokedToken { .. } | PrepError::NoValidAccounts { .. }
        )
    }
}

/// The `{status, error, message, requestId, revoked?}` shape from §7.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub status: u16,
    pub error: ErrorCode,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked: Option<bool>,
}

impl ErrorPayload {
    pub fn from_error(err: &PrepError, request_id: impl Into<String>) -> Self {
        let code = err.code();
        Self {
            status: code.http_status(),
            error: code,
            message: err.to_string(),
            request_id: request_id.into(),
            revoked: err.is_revoked().then_some(true),
        }
    }
}

pub type Result<T> = std::result::Result<T, PrepError>;
