//! Generic chat-completions client.
//!
//! Modeled on the teacher's `brain::provider::custom_openai_compatible`
//! implementation (same `reqwest::Client` construction, bearer header, and
//! chat-completions wire shape) but narrowed to exactly what the pipeline
//! needs: one request/response struct pair plus the retry/backoff policy
//! from spec §5 (60s timeout, 3 attempts, honor `retry-after`).

use crate::config::LlmConfig;
use crate::utils::retry::{RetryConfig, RetryableError, retry};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm http error {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("llm request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm response had no content")]
    EmptyResponse,
    #[error("llm refused: {0}")]
    Refused(String),
}

impl RetryableError for LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            LlmError::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

impl LlmClient {
    pub fn new(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = cfg
            .api_key
            .as_ref()
            .map(|s| s.expose_secret().to_string())
            .unwrap_or_default();
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: cfg.base_url.clone(),
            default_model: cfg.model.clone(),
        })
    }

    /// A single chat-completions call with retry on 429/5xx, doubling
    /// `max_tokens` once (capped at 8000) if the model truncated on
    /// `finish_reason == "length"` near the requested budget.
    pub async fn complete(&self, messages: Vec<ChatMessage>, max_tokens: u32) -> Result<String, LlmError> {
        self.complete_inner(messages, max_tokens, true).await
    }

    async fn complete_inner(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        allow_length_retry: bool,
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let cfg = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };

        let body = retry(cfg, |_attempt| {
            let url = url.clone();
            let messages = messages.clone();
            async move {
                let resp = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&ChatRequest {
                        model: &self.default_model,
                        messages: &messages,
                        max_tokens,
                    })
                    .send()
                    .await?;

                if let Some(retry_after) = retry_after_header(&resp) {
                    let status = resp.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(RateLimited { body, retry_after }.into());
                    }
                }

                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(LlmError::Http { status, body });
                }
                let parsed: ChatResponse = resp.json().await?;
                Ok(parsed)
            }
        })
        .await?;

        let choice = body.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;
        if let Some(refusal) = choice.message.refusal {
            return Err(LlmError::Refused(refusal));
        }
        let content = choice.message.content.unwrap_or_default();

        if content.trim().is_empty() {
            let truncated = choice.finish_reason.as_deref() == Some("length");
            if truncated && allow_length_retry && max_tokens < 8000 {
                let doubled = (max_tokens * 2).min(8000);
                return Box::pin(self.complete_inner(messages, doubled, false)).await;
            }
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }
}

struct RateLimited {
    body: String,
    retry_after: Duration,
}

impl From<RateLimited> for LlmError {
    fn from(r: RateLimited) -> Self {
        LlmError::Http {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: format!("retry_after={:?} body={}", r.retry_after, r.body),
        }
    }
}

fn retry_after_header(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_constructors() {
        let m = ChatMessage::system("be terse");
        assert_eq!(m.role, "system");
        let m = ChatMessage::user("hi");
        assert_eq!(m.role, "user");
    }

    #[test]
    fn llm_error_classifies_rate_limit_as_retryable() {
        let e = LlmError::Http {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        };
        assert!(e.is_retryable());
        let e = LlmError::Http {
            status: StatusCode::BAD_REQUEST,
            body: String::new(),
        };
        assert!(!e.is_retryable());
    }
}
