//! PurposeDetector (spec §4.5): three stages composed — `calendar_infer` and
//! `email_find_context` run concurrently, then `final_aggregate` combines
//! both hypotheses into one arbitrated result.

use crate::domain::{Confidence, EmailArtifact, Meeting};
use crate::llm::{ChatMessage, LlmClient, json::parse_tolerant};
use serde::Deserialize;

const MIN_OVERLAP_SMALL: f64 = 1.0;
const MIN_OVERLAP_LARGE: f64 = 0.75;
const SMALL_MEETING_THRESHOLD: usize = 4;
const MAX_CONTEXT_EMAILS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurposeSource {
    Calendar,
    Email,
    Combined,
    Llm,
    Uncertain,
}

#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct PurposeResult {
    pub purpose: String,
    pub agenda: Vec<String>,
    pub confidence: Confidence,
    pub source: PurposeSource,
    #[serde(default)]
    pub context_email_refs: Vec<String>,
}

impl PurposeResult {
    fn empty() -> Self {
        Self { purpose: String::new(), agenda: Vec::new(), confidence: Confidence::Low, source: PurposeSource::Uncertain, context_email_refs: Vec::new() }
    }
}

/// Fraction of a meeting's attendee set that overlaps an email's participant
/// set (spec §3 invariant): `>=100%` for small meetings, `>=75%` for larger.
pub fn attendee_overlap_qualifies(email: &EmailArtifact, attendee_emails: &[String]) -> bool {
    if attendee_emails.is_empty() {
        return false;
    }
    let participants = email.participants();
    let overlap = attendee_emails.iter().filter(|a| participants.contains(&a.to_ascii_lowercase())).count();
    let ratio = overlap as f64 / attendee_emails.len() as f64;
    let threshold = if attendee_emails.len() <= SMALL_MEETING_THRESHOLD { MIN_OVERLAP_SMALL } else { MIN_OVERLAP_LARGE };
    ratio >= threshold
}

#[derive(Deserialize)]
struct CalendarInference {
    purpose: String,
    #[serde(default)]
    agenda: Vec<String>,
    confidence: Confidence,
}

#[derive(Deserialize)]
struct AggregateResult {
    purpose: String,
    #[serde(default)]
    agenda: Vec<String>,
    confidence: Confidence,
    source: PurposeSource,
}

pub struct PurposeDetector {
    llm: LlmClient,
}

impl PurposeDetector {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub async fn detect(&self, meeting: &Meeting, attendee_names: &[String], emails: &[EmailArtifact], attendee_emails: &[String]) -> PurposeResult {
        let (calendar, email) = tokio::join!(self.calendar_infer(meeting, attendee_names), self.email_find_context(emails, attendee_emails));

        self.final_aggregate(calendar, email).await
    }

    async fn calendar_infer(&self, meeting: &Meeting, attendee_names: &[String]) -> PurposeResult {
        let prompt = format!(
            "Infer the purpose of this meeting from its title, description, and attendees. Never invent agenda items not implied by the text.\n\
             Title: {}\nDescription: {}\nAttendees: {}\n\
             Respond with JSON: {{\"purpose\": string, \"agenda\": [string], \"confidence\": \"low|medium|high\"}}",
            meeting.title,
            meeting.description.as_deref().unwrap_or(""),
            attendee_names.join(", "),
        );

        let messages = vec![ChatMessage::system("You infer meeting purpose from calendar metadata only."), ChatMessage::user(&prompt)];

        let result = async {
            let response = self.llm.complete(messages, 400).await.ok()?;
            let value = parse_tolerant(&response)?;
            serde_json::from_value::<CalendarInference>(value).ok()
        }
        .await;

        match result {
            Some(c) => PurposeResult { purpose: c.purpose, agenda: c.agenda, confidence: c.confidence, source: PurposeSource::Calendar, context_email_refs: Vec::new() },
            None => PurposeResult::empty(),
        }
    }

    async fn email_find_context(&self, emails: &[EmailArtifact], attendee_emails: &[String]) -> PurposeResult {
        let mut qualifying: Vec<&EmailArtifact> = emails.iter().filter(|e| attendee_overlap_qualifies(e, attendee_emails)).collect();
        if qualifying.is_empty() {
            return PurposeResult::empty();
        }

        qualifying.sort_by(|a, b| b.date.cmp(&a.date));
        qualifying.truncate(MAX_CONTEXT_EMAILS);

        let refs: Vec<String> = qualifying.iter().map(|e| e.id.clone()).collect();
        let excerpt = qualifying
            .iter()
            .map(|e| format!("Subject: {}\nSnippet: {}", e.subject, e.snippet))
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = format!(
            "Extract only explicit meeting purpose/agenda mentioned in these emails. Do not infer beyond what is stated.\n{excerpt}\n\
             Respond with JSON: {{\"purpose\": string, \"agenda\": [string], \"confidence\": \"low|medium|high\"}}"
        );
        let messages = vec![ChatMessage::system("You extract explicit meeting context from email threads."), ChatMessage::user(&prompt)];

        let result = async {
            let response = self.llm.complete(messages, 400).await.ok()?;
            let value = parse_tolerant(&response)?;
            serde_json::from_value::<CalendarInference>(value).ok()
        }
        .await;

        match result {
            Some(c) => PurposeResult { purpose: c.purpose, agenda: c.agenda, confidence: c.confidence, source: PurposeSource::Email, context_email_refs: refs },
            None => PurposeResult::empty(),
        }
    }

    async fn final_aggregate(&self, calendar: PurposeResult, email: PurposeResult) -> PurposeResult {
        if calendar.purpose.is_empty() && email.purpose.is_empty() {
            return PurposeResult::empty();
        }

        let prompt = format!(
            "Two independent hypotheses about a meeting's purpose were produced. Prefer the more specific and higher-confidence source. \
             If both substantially agree, upgrade confidence one step and use source \"combined\".\n\
             Calendar hypothesis: purpose={:?} agenda={:?} confidence={:?}\n\
             Email hypothesis: purpose={:?} agenda={:?} confidence={:?}\n\
             Respond with JSON: {{\"purpose\": string, \"agenda\": [string], \"confidence\": \"low|medium|high\", \"source\": \"calendar|email|combined|llm|uncertain\"}}",
            calendar.purpose, calendar.agenda, calendar.confidence, email.purpose, email.agenda, email.confidence,
        );
        let messages = vec![ChatMessage::system("You arbitrate between two meeting-purpose hypotheses."), ChatMessage::user(&prompt)];

        let result = async {
            let response = self.llm.complete(messages, 400).await.ok()?;
            let value = parse_tolerant(&response)?;
            serde_json::from_value::<AggregateResult>(value).ok()
        }
        .await;

        match result {
            Some(a) => PurposeResult { purpose: a.purpose, agenda: a.agenda, confidence: a.confidence, source: a.source, context_email_refs: email.context_email_refs },
            None => {
                // Arbiter call failed; prefer whichever hypothesis is non-empty.
                if !calendar.purpose.is_empty() && !email.purpose.is_empty() {
                    PurposeResult { source: PurposeSource::Combined, ..calendar }
                } else if !calendar.purpose.is_empty() {
                    calendar
                } else {
                    email
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn email(from: &str, to: Vec<&str>) -> EmailArtifact {
        EmailArtifact {
            id: "e1".into(),
            subject: "Sync".into(),
            from: from.into(),
            to: to.into_iter().map(String::from).collect(),
            cc: vec![],
            bcc: vec![],
            date: Utc::now(),
            body: String::new(),
            snippet: "agenda: budget review".into(),
            attachments: vec![],
        }
    }

    #[test]
    fn small_meeting_requires_full_overlap() {
        let e = email("alice@x.com", vec!["me@x.com"]);
        let attendees = vec!["alice@x.com".to_string(), "bob@x.com".to_string()];
        assert!(!attendee_overlap_qualifies(&e, &attendees));
    }

    #[test]
    fn full_overlap_qualifies() {
        let e = email("alice@x.com", vec!["bob@x.com"]);
        let attendees = vec!["alice@x.com".to_string(), "bob@x.com".to_string()];
        assert!(attendee_overlap_qualifies(&e, &attendees));
    }

    #[test]
    fn large_meeting_accepts_partial_overlap() {
        let e = email("a@x.com", vec!["b@x.com", "c@x.com"]);
        let attendees = vec!["a@x.com".into(), "b@x.com".into(), "c@x.com".into(), "d@x.com".into(), "e@x.com".into()];
        assert!(attendee_overlap_qualifies(&e, &attendees));
    }

    #[test]
    fn empty_attendees_never_qualifies() {
        let e = email("a@x.com", vec!["b@x.com"]);
        assert!(!attendee_overlap_qualifies(&e, &[]));
    }
}
