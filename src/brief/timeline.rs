//! Timeline construction (spec §4.8 stage 4): merges emails, documents, and
//! past meetings into a typed event stream, filtered to the last 180 days,
//! ranked by an LLM arbiter, capped at 100, with the upcoming meeting
//! pinned as a reference event.

use crate::domain::{CalendarArtifact, DocumentArtifact, EmailArtifact, Meeting, TimelineEvent};
use crate::llm::{ChatMessage, LlmClient, json::parse_tolerant};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

const LOOKBACK_DAYS: i64 = 180;
const MAX_CANDIDATES: usize = 100;
const FINAL_CAP: usize = 100;

pub fn build_candidates(emails: &[EmailArtifact], documents: &[DocumentArtifact], past_meetings: &[CalendarArtifact], meeting_start: DateTime<Utc>) -> Vec<TimelineEvent> {
    let cutoff = meeting_start - Duration::days(LOOKBACK_DAYS);

    let mut events: Vec<TimelineEvent> = Vec::new();

    events.extend(emails.iter().filter(|e| e.date >= cutoff).map(|e| TimelineEvent {
        kind: "email".into(),
        date: e.date,
        name: e.subject.clone(),
        participants: e.participants(),
        snippet: Some(e.snippet.clone()),
        id: e.id.clone(),
    }));

    events.extend(documents.iter().filter(|d| d.modified_time >= cutoff).map(|d| TimelineEvent {
        kind: "document".into(),
        date: d.modified_time,
        name: d.name.clone(),
        participants: vec![d.owner_email.to_ascii_lowercase()],
        snippet: None,
        id: d.id.clone(),
    }));

    events.extend(past_meetings.iter().filter(|m| m.start >= cutoff).map(|m| TimelineEvent {
        kind: "meeting".into(),
        date: m.start,
        name: m.summary.clone(),
        participants: m.attendees.iter().map(|a| a.email.to_ascii_lowercase()).collect(),
        snippet: None,
        id: m.id.clone(),
    }));

    events.sort_by(|a, b| b.date.cmp(&a.date));
    events
}

#[derive(Deserialize)]
struct RankResponse {
    #[serde(default)]
    important_ids: Vec<String>,
}

pub struct TimelineBuilder {
    llm: LlmClient,
}

impl TimelineBuilder {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub async fn build(&self, meeting: &Meeting, emails: &[EmailArtifact], documents: &[DocumentArtifact], past_meetings: &[CalendarArtifact]) -> Vec<TimelineEvent> {
        let mut candidates = build_candidates(emails, documents, past_meetings, meeting.start);
        candidates.truncate(MAX_CANDIDATES);

        let reference = TimelineEvent { kind: "upcoming_meeting".into(), date: meeting.start, name: meeting.title.clone(), participants: meeting.attendees.iter().map(|a| a.email.to_ascii_lowercase()).collect(), snippet: None, id: meeting.id.clone() };

        if candidates.is_empty() {
            return vec![reference];
        }

        let ranked_ids = self.rank(&candidates).await;
        let mut selected: Vec<TimelineEvent> = if ranked_ids.is_empty() {
            candidates
        } else {
            candidates.into_iter().filter(|e| ranked_ids.contains(&e.id)).collect()
        };

        selected.push(reference);
        selected.sort_by(|a, b| b.date.cmp(&a.date));
        selected.truncate(FINAL_CAP);
        selected
    }

    async fn rank(&self, candidates: &[TimelineEvent]) -> Vec<String> {
        let listing = candidates.iter().map(|e| format!("id={} type={} date={} name={}", e.id, e.kind, e.date, e.name)).collect::<Vec<_>>().join("\n");
        let prompt = format!("Select the most important event ids for a meeting-prep timeline from this candidate list.\n{listing}\nRespond with JSON: {{\"important_ids\": [string]}}");
        let messages = vec![ChatMessage::system("You curate meeting-history timelines by importance."), ChatMessage::user(&prompt)];

        let response = match self.llm.complete(messages, 800).await {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };
        parse_tolerant(&response).and_then(|v| serde_json::from_value::<RankResponse>(v).ok()).map(|r| r.important_ids).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attendee;

    fn email(id: &str, date: DateTime<Utc>) -> EmailArtifact {
        EmailArtifact { id: id.into(), subject: "S".into(), from: "a@x.com".into(), to: vec![], cc: vec![], bcc: vec![], date, body: String::new(), snippet: String::new(), attachments: vec![] }
    }

    #[test]
    fn candidates_filtered_to_lookback_window() {
        let now = Utc::now();
        let recent = email("e1", now - Duration::days(10));
        let old = email("e2", now - Duration::days(400));
        let events = build_candidates(&[recent, old], &[], &[], now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "e1");
    }

    #[test]
    fn candidates_sorted_descending() {
        let now = Utc::now();
        let a = email("a", now - Duration::days(5));
        let b = email("b", now - Duration::days(1));
        let events = build_candidates(&[a, b], &[], &[], now);
        assert_eq!(events[0].id, "b");
    }

    #[test]
    fn meeting_participants_lowercased() {
        let att = Attendee { email: "Bob@X.com".into(), display_name: None, response_status: None };
        let m = CalendarArtifact { id: "m1".into(), summary: "Past".into(), start: Utc::now() - Duration::days(10), end: Utc::now(), attendees: vec![att] };
        let events = build_candidates(&[], &[], &[m], Utc::now());
        assert_eq!(events[0].participants, vec!["bob@x.com".to_string()]);
    }
}
