//! Mail surface: list by query, fetch message.

use super::error::{ProviderError, classify_status};
use super::truncate::truncate_for_storage;
use crate::domain::EmailArtifact;
use crate::utils::retry::{RetryConfig, retry};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait MailClient: Send + Sync {
    /// List message ids matching a provider-native query string, paginating
    /// internally up to `max_results`.
    async fn list(&self, query: &str, max_results: usize) -> Result<Vec<String>, ProviderError>;

    /// Fetch one message by id, with body truncated for storage (§4.2).
    async fn fetch(&self, message_id: &str) -> Result<EmailArtifact, ProviderError>;
}

#[derive(Clone)]
pub struct GmailClient {
    http: Client,
    access_token: String,
}

impl GmailClient {
    pub fn new(access_token: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build gmail http client");
        Self { http, access_token }
    }

    fn retry_cfg() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

#[derive(Deserialize)]
struct ListResponse {
    messages: Option<Vec<MessageRef>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Deserialize)]
struct GmailMessage {
    id: String,
    snippet: Option<String>,
    payload: GmailPayload,
    #[serde(rename = "internalDate")]
    internal_date: Option<String>,
}

#[derive(Deserialize)]
struct GmailPayload {
    headers: Vec<GmailHeader>,
    #[serde(default)]
    body: Option<GmailBody>,
    #[serde(default)]
    parts: Vec<GmailPart>,
}

#[derive(Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Deserialize, Default)]
struct GmailBody {
    data: Option<String>,
}

#[derive(Deserialize)]
struct GmailPart {
    #[serde(rename = "mimeType")]
    mime_type: String,
    body: Option<GmailBody>,
}

fn header<'a>(headers: &'a [GmailHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn split_addresses(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn decode_body(payload: &GmailPayload) -> String {
    use base64::Engine;
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    if let Some(body) = &payload.body {
        if let Some(data) = &body.data {
            if let Ok(bytes) = engine.decode(data) {
                return String::from_utf8_lossy(&bytes).to_string();
            }
        }
    }
    for part in &payload.parts {
        if part.mime_type == "text/plain" {
            if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
                if let Ok(bytes) = engine.decode(data) {
                    return String::from_utf8_lossy(&bytes).to_string();
                }
            }
        }
    }
    String::new()
}

#[async_trait]
impl MailClient for GmailClient {
    async fn list(&self, query: &str, max_results: usize) -> Result<Vec<String>, ProviderError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let remaining = max_results.saturating_sub(ids.len());
            if remaining == 0 {
                break;
            }
            let page_size = remaining.min(100);
            let mut url = format!(
                "https://gmail.googleapis.com/gmail/v1/users/me/messages?q={}&maxResults={}",
                urlencoding::encode(query),
                page_size
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={token}"));
            }

            let page: ListResponse = retry(Self::retry_cfg(), |_attempt| {
                let url = url.clone();
                async move { self.send(&url).await }
            })
            .await?;

            let messages = page.messages.unwrap_or_default();
            let got_any = !messages.is_empty();
            ids.extend(messages.into_iter().map(|m| m.id));
            page_token = page.next_page_token;
            if page_token.is_none() || !got_any {
                break;
            }
        }
        ids.truncate(max_results);
        Ok(ids)
    }

    async fn fetch(&self, message_id: &str) -> Result<EmailArtifact, ProviderError> {
        let url =
            format!("https://gmail.googleapis.com/gmail/v1/users/me/messages/{message_id}?format=full");
        let msg: GmailMessage = retry(Self::retry_cfg(), |_attempt| {
            let url = url.clone();
            async move { self.send(&url).await }
        })
        .await?;

        let date = header(&msg.payload.headers, "Date")
            .and_then(|d| chrono::DateTime::parse_from_rfc2822(d).ok())
            .map(|d| d.with_timezone(&chrono::Utc))
            .or_else(|| {
                msg.internal_date
                    .as_ref()
                    .and_then(|ms| ms.parse::<i64>().ok())
                    .and_then(chrono::DateTime::from_timestamp_millis)
            })
            .unwrap_or_else(chrono::Utc::now);

        let body = truncate_for_storage(&decode_body(&msg.payload));

        Ok(EmailArtifact {
            id: msg.id,
            subject: header(&msg.payload.headers, "Subject").unwrap_or_default().to_string(),
            from: header(&msg.payload.headers, "From").unwrap_or_default().to_string(),
            to: split_addresses(header(&msg.payload.headers, "To")),
            cc: split_addresses(header(&msg.payload.headers, "Cc")),
            bcc: split_addresses(header(&msg.payload.headers, "Bcc")),
            date,
            body,
            snippet: msg.snippet.unwrap_or_default(),
            attachments: Vec::new(),
        })
    }
}

impl GmailClient {
    async fn send<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ProviderError> {
        let resp = self.http.get(url).bearer_auth(&self.access_token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let headers = vec![GmailHeader { name: "subject".into(), value: "Hello".into() }];
        assert_eq!(header(&headers, "Subject"), Some("Hello"));
    }

    #[test]
    fn split_addresses_trims_and_filters() {
        let addrs = split_addresses(Some("a@x.com,  b@x.com ,"));
        assert_eq!(addrs, vec!["a@x.com".to_string(), "b@x.com".to_string()]);
    }
}
