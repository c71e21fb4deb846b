//! Calendar surface: list events within a window on the primary calendar.

use super::error::{ProviderError, classify_status};
use crate::domain::{Attendee, CalendarArtifact};
use crate::utils::retry::{RetryConfig, retry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn list_events(
        &self,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<CalendarArtifact>, ProviderError>;
}

#[derive(Clone)]
pub struct GoogleCalendarClient {
    http: Client,
    access_token: String,
}

impl GoogleCalendarClient {
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
}

#[derive(Deserialize)]
struct EventsResponse {
    items: Vec<CalendarEvent>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct CalendarEvent {
    id: String,
    #[serde(default)]
    summary: String,
    start: EventTime,
    end: EventTime,
    #[serde(default)]
    attendees: Vec<EventAttendee>,
}

#[derive(Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<DateTime<Utc>>,
    date: Option<chrono::NaiveDate>,
}

impl EventTime {
    fn resolve(&self) -> DateTime<Utc> {
        self.date_time.unwrap_or_else(|| {
            self.date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
                .unwrap_or_else(Utc::now)
        })
    }
}

#[derive(Deserialize)]
struct EventAttendee {
    email: String,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "responseStatus")]
    response_status: Option<String>,
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn list_events(
        &self,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<CalendarArtifact>, ProviderError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let remaining = max_results.saturating_sub(out.len());
            if remaining == 0 {
                break;
            }
            let page_size = remaining.min(250);
            let mut url = format!(
                "https://www.googleapis.com/calendar/v3/calendars/primary/events?timeMin={}&timeMax={}&singleEvents=true&maxResults={}",
                urlencoding::encode(&after.to_rfc3339()),
                urlencoding::encode(&before.to_rfc3339()),
                page_size
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={token}"));
            }

            let page: EventsResponse = retry(Self::retry_cfg(), |_attempt| {
                let url = url.clone();
                async move {
                    let resp = self.http.get(&url).bearer_auth(&self.access_token).send().await?;
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(classify_status(status, resp.text().await.unwrap_or_default()));
                    }
                    Ok::<EventsResponse, ProviderError>(resp.json().await?)
                }
            })
            .await?;

            let got_any = !page.items.is_empty();
            for e in page.items {
                out.push(CalendarArtifact {
                    id: e.id,
                    summary: e.summary,
                    start: e.start.resolve(),
                    end: e.end.resolve(),
                    attendees: e
                        .attendees
                        .into_iter()
                        .map(|a| Attendee {
                            email: a.email,
                            display_name: a.display_name,
                            response_status: a.response_status,
                        })
                        .collect(),
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
