//! Core data model (spec §3): accounts, users, harvested artifacts, and the
//! produced Brief. These types cross every component boundary, so they stay
//! free of any single component's internal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Microsoft,
}

/// One provider-linked identity (mail+drive+calendar under one address)
/// owned by a [`User`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub provider: Provider,
    pub email: String,
    pub access_token: Option<String>,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub is_primary: bool,
    pub revoked: bool,
}

impl Account {
    /// `expires_at` null is treated as expired (spec §3).
    pub fn is_expired(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        match self.expires_at {
            Some(exp) => exp - now < threshold,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub emails: Vec<String>,
    pub name: String,
    /// IANA zone name; default "UTC".
    pub timezone: String,
}

impl User {
    pub fn is_me(&self, address: &str) -> bool {
        let addr = address.to_ascii_lowercase();
        self.emails.iter().any(|e| e.to_ascii_lowercase() == addr)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    pub display_name: Option<String>,
    pub response_status: Option<String>,
}

impl Attendee {
    /// Resource calendars (conference rooms etc.) aren't people.
    pub fn is_resource(&self) -> bool {
        self.email.ends_with("@resource.calendar.google.com")
    }
}

/// External calendar event, preserved as-is plus a classification tag and a
/// `_timezone` label. Provider fields are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub organizer_email: Option<String>,
    pub attendees: Vec<Attendee>,
    #[serde(rename = "_timezone")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailArtifact {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub date: DateTime<Utc>,
    pub body: String,
    pub snippet: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl EmailArtifact {
    /// All participant addresses, lowercased. Used by the overlap rule.
    pub fn participants(&self) -> Vec<String> {
        let mut v = vec![self.from.clone()];
        v.extend(self.to.iter().cloned());
        v.extend(self.cc.iter().cloned());
        v.into_iter().map(|s| s.to_ascii_lowercase()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentArtifact {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub modified_time: DateTime<Utc>,
    pub owner: String,
    pub owner_email: String,
    pub url: String,
    /// Populated only for text-exportable types, truncated to 50 KiB.
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarArtifact {
    pub id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<Attendee>,
}

/// The amount of work classification authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrepDepth {
    Full,
    Minimal,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Meeting,
    PublicEvent,
    PersonalReminder,
    Leisure,
    Travel,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub confidence: Confidence,
    pub should_prep: bool,
    pub prep_depth: PrepDepth,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// ≤150-char prose summary derived from a [`Brief`].
pub type OneLiner = String;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimelineEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub date: DateTime<Utc>,
    pub name: String,
    pub participants: Vec<String>,
    pub snippet: Option<String>,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Brief {
    pub user_id: String,
    pub meeting_id: String,
    /// Full, untruncated executive summary paragraph.
    pub summary: String,
    /// Same summary condensed to a notification-length one-liner.
    pub one_liner: OneLiner,
    pub purpose: String,
    pub agenda: Vec<String>,
    pub attendees: Vec<Attendee>,
    pub email_analysis: StageOutput,
    pub document_analysis: StageOutput,
    pub relationship_analysis: StageOutput,
    pub contribution_analysis: StageOutput,
    pub broader_narrative: String,
    pub timeline: Vec<TimelineEvent>,
    pub recommendations: Vec<String>,
    pub action_items: Vec<String>,
    pub stats: BriefStats,
    #[serde(rename = "_extraction_data")]
    pub extraction_data: ExtractionData,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StageOutput {
    pub narrative: String,
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BriefStats {
    pub emails_considered: usize,
    pub emails_relevant: usize,
    pub documents_considered: usize,
    pub documents_relevant: usize,
    pub attendees_researched: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractionData {
    /// Per-artifact relevance reasoning, keyed by artifact id, for UI
    /// inspection.
    pub reasoning: HashMap<String, String>,
    pub document_staleness: Vec<StalenessFlag>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessFlag {
    pub kind: String,
    pub severity: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_null_expiry_is_expired() {
        let acct = Account {
            id: "a1".into(),
            user_id: "u1".into(),
            provider: Provider::Google,
            email: "a@example.com".into(),
            access_token: None,
            refresh_token: "rt".into(),
            expires_at: None,
            scopes: vec![],
            is_primary: true,
            revoked: false,
        };
        assert!(acct.is_expired(Utc::now(), chrono::Duration::minutes(5)));
    }

    #[test]
    fn user_is_me_case_insensitive() {
        let u = User {
            id: "u1".into(),
            email: "Me@Example.com".into(),
            emails: vec!["me@example.com".into()],
            name: "Me".into(),
            timezone: "UTC".into(),
        };
        assert!(u.is_me("ME@EXAMPLE.COM"));
        assert!(!u.is_me("other@example.com"));
    }

    #[test]
    fn resource_calendar_detected() {
        let att = Attendee {
            email: "room@resource.calendar.google.com".into(),
            display_name: None,
            response_status: None,
        };
        assert!(att.is_resource());
    }
}
