//! Drive surface: list by query, export/download content for exportable
//! mime types.

use super::error::{ProviderError, classify_status};
use super::truncate::truncate_for_storage;
use crate::domain::DocumentArtifact;
use crate::utils::retry::{RetryConfig, retry};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const EXPORTABLE_MIME_TYPES: &[&str] = &[
    "application/vnd.google-apps.document",
    "application/vnd.google-apps.spreadsheet",
    "application/pdf",
    "text/plain",
];

#[async_trait]
pub trait DriveClient: Send + Sync {
    async fn list(&self, query: &str, max_results: usize) -> Result<Vec<DocumentArtifact>, ProviderError>;
}

#[derive(Clone)]
pub struct GoogleDriveClient {
    http: Client,
    access_token: String,
}

impl GoogleDriveClient {
    pub fn new(access_token: String) -> Self {
        let http = Client::builder().timeout(Duration::from_secs(30)).build().expect("http client");
        Self { http, access_token }
    }

    fn retry_cfg() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ProviderError> {
        let resp = self.http.get(url).bearer_auth(&self.access_token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, resp.text().await.unwrap_or_default()));
        }
        Ok(resp.json().await?)
    }

    async fn export_text(&self, file_id: &str, mime_type: &str) -> Option<String> {
        if !EXPORTABLE_MIME_TYPES.contains(&mime_type) {
            return None;
        }
        let url = format!(
            "https://www.googleapis.com/drive/v3/files/{file_id}/export?mimeType=text/plain"
        );
        let resp = self.http.get(&url).bearer_auth(&self.access_token).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.text().await.ok()
    }
}

#[derive(Deserialize)]
struct FileListResponse {
    files: Vec<DriveFile>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(rename = "modifiedTime")]
    modified_time: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "lastModifyingUser", default)]
    last_modifying_user: Option<DriveUser>,
    #[serde(rename = "webViewLink", default)]
    web_view_link: Option<String>,
}

#[derive(Deserialize, Default)]
struct DriveUser {
    #[serde(rename = "displayName", default)]
    display_name: String,
    #[serde(rename = "emailAddress", default)]
    email_address: String,
}

#[async_trait]
impl DriveClient for GoogleDriveClient {
    async fn list(&self, query: &str, max_results: usize) -> Result<Vec<DocumentArtifact>, ProviderError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let remaining = max_results.saturating_sub(out.len());
            if remaining == 0 {
                break;
            }
            let page_size = remaining.min(100);
            let mut url = format!(
                "https://www.googleapis.com/drive/v3/files?q={}&pageSize={}&fields=nextPageToken,files(id,name,mimeType,size,modifiedTime,lastModifyingUser,webViewLink)",
                urlencoding::encode(query),
                page_size
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={token}"));
            }

            let page: FileListResponse =
                retry(Self::retry_cfg(), |_attempt| { let url = url.clone(); async move { self.get(&url).await } }).await?;

            let got_any = !page.files.is_empty();
            for f in page.files {
                let content = self.export_text(&f.id, &f.mime_type).await.map(|c| truncate_for_storage(&c));
                let user = f.last_modifying_user.unwrap_or_default();
                out.push(DocumentArtifact {
                    id: f.id,
                    name: f.name,
                    mime_type: f.mime_type,
                    size: f.size.and_then(|s| s.parse().ok()).unwrap_or(0),
                    modified_time: f.modified_time,
                    owner: user.display_name,
                    owner_email: user.email_address,
                    url: f.web_view_link.unwrap_or_default(),
                    content,
                });
            }
            page_token = page.next_page_token;
            if page_token.is_none() || !got_any {
                break;
            }
        }
        out.truncate(max_results);
        Ok(out)
    }
}
