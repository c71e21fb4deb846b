//! EventClassifier (spec §4.4): labels a raw meeting and picks a prep depth.
//!
//! LLM-first with a deterministic rule cascade fallback. The cascade is a
//! free function over a small extracted value type so it stays pure w.r.t.
//! `(event_fields, user_emails)` — no wall-clock, no RNG, no shared state.

use crate::domain::{Classification, Confidence, EventType, Meeting, PrepDepth};
use crate::llm::{ChatMessage, LlmClient, json::parse_tolerant};
use std::collections::HashSet;

const CONFERENCE_KEYWORDS: &[&str] = &["conference", "summit", "webinar", "town hall", "all-hands", "keynote"];
const REMINDER_KEYWORDS: &[&str] = &["reminder", "deadline", "due", "renew", "pay", "submit"];
const LEISURE_KEYWORDS: &[&str] = &["birthday", "lunch with", "dinner with", "vacation", "holiday", "party"];
const TRAVEL_KEYWORDS: &[&str] = &["flight", "departure", "arrival", "layover", "boarding", "itinerary"];
const SPEAKER_KEYWORDS: &[&str] = &["speaker", "panelist"];

/// Normalized features extracted once up front, so the cascade never has to
/// re-derive them from the raw meeting.
#[derive(Debug, Clone)]
pub struct ClassifierFeatures {
    pub attendee_count: usize,
    pub user_is_organizer: bool,
    pub user_is_attendee: bool,
    pub title_lower: String,
    pub has_person_mention: bool,
    pub is_speaker_or_panelist: bool,
}

impl ClassifierFeatures {
    pub fn extract(meeting: &Meeting, user_emails: &HashSet<String>) -> Self {
        let user_is_organizer = meeting
            .organizer_email
            .as_ref()
            .map(|o| user_emails.contains(&o.to_ascii_lowercase()))
            .unwrap_or(false);

        let non_user_attendees: Vec<_> = meeting
            .attendees
            .iter()
            .filter(|a| !user_emails.contains(&a.email.to_ascii_lowercase()))
            .collect();

        let user_is_attendee = meeting.attendees.iter().any(|a| user_emails.contains(&a.email.to_ascii_lowercase()));

        let title_lower = meeting.title.to_ascii_lowercase();

        // "call Alice", "1:1 with Bob" — a capitalized word following a verb
        // cue, heuristically treated as a person reference.
        let has_person_mention = title_lower.split_whitespace().any(|w| w == "with")
            || meeting.title.split_whitespace().any(|w| w.chars().next().is_some_and(|c| c.is_uppercase()) && w.len() > 2);

        // The user's own attendee entry carries a role prefix like
        // "Speaker: Bob" or "Panelist: Bob" when invited to present.
        let is_speaker_or_panelist = meeting
            .attendees
            .iter()
            .filter(|a| user_emails.contains(&a.email.to_ascii_lowercase()))
            .filter_map(|a| a.display_name.as_deref())
            .any(|name| {
                let lower = name.to_ascii_lowercase();
                SPEAKER_KEYWORDS.iter().any(|k| lower.contains(k))
            });

        Self {
            attendee_count: non_user_attendees.len(),
            user_is_organizer,
            user_is_attendee,
            title_lower,
            has_person_mention,
            is_speaker_or_panelist,
        }
    }
}

/// Deterministic rule cascade (spec §4.4, rules 1-7), pure w.r.t. its inputs.
pub fn classify_rules(features: &ClassifierFeatures) -> Classification {
    let title = features.title_lower.as_str();

    if features.attendee_count > 20
        && !features.user_is_organizer
        && !features.is_speaker_or_panelist
        && CONFERENCE_KEYWORDS.iter().any(|k| title.contains(k))
    {
        return Classification {
            event_type: EventType::PublicEvent,
            confidence: Confidence::Medium,
            should_prep: false,
            prep_depth: PrepDepth::Minimal,
            reason: "large attendee list with conference-like title".into(),
        };
    }

    if features.attendee_count <= 1 && REMINDER_KEYWORDS.iter().any(|k| title.contains(k)) {
        return if features.has_person_mention {
            Classification {
                event_type: EventType::Meeting,
                confidence: Confidence::Medium,
                should_prep: true,
                prep_depth: PrepDepth::Full,
                reason: "reminder-shaped title mentions a person".into(),
            }
        } else {
            Classification {
                event_type: EventType::PersonalReminder,
                confidence: Confidence::High,
                should_prep: false,
                prep_depth: PrepDepth::None,
                reason: "reminder keyword with no attendees or person mention".into(),
            }
        };
    }

    if LEISURE_KEYWORDS.iter().any(|k| title.contains(k)) {
        return Classification {
            event_type: EventType::Leisure,
            confidence: Confidence::Medium,
            should_prep: false,
            prep_depth: PrepDepth::Minimal,
            reason: "leisure keyword in title".into(),
        };
    }

    if TRAVEL_KEYWORDS.iter().any(|k| title.contains(k)) {
        return Classification {
            event_type: EventType::Travel,
            confidence: Confidence::Medium,
            should_prep: false,
            prep_depth: PrepDepth::Minimal,
            reason: "travel keyword in title".into(),
        };
    }

    if features.user_is_organizer || features.is_speaker_or_panelist {
        return Classification {
            event_type: EventType::Meeting,
            confidence: Confidence::High,
            should_prep: true,
            prep_depth: PrepDepth::Full,
            reason: if features.user_is_organizer { "user organizes this event".into() } else { "user is a speaker or panelist".into() },
        };
    }

    if features.attendee_count >= 2 {
        return Classification {
            event_type: EventType::Meeting,
            confidence: Confidence::High,
            should_prep: true,
            prep_depth: PrepDepth::Full,
            reason: "multiple non-user attendees".into(),
        };
    }

    if features.attendee_count == 1 {
        return Classification {
            event_type: EventType::Meeting,
            confidence: Confidence::Medium,
            should_prep: true,
            prep_depth: PrepDepth::Full,
            reason: "one-on-one with a single non-user attendee".into(),
        };
    }

    Classification {
        event_type: EventType::Meeting,
        confidence: Confidence::Low,
        should_prep: true,
        prep_depth: PrepDepth::Full,
        reason: "no rule matched; defaulting to full prep".into(),
    }
}

#[derive(serde::Deserialize)]
struct LlmClassification {
    #[serde(rename = "type")]
    event_type: EventType,
    confidence: Confidence,
    should_prep: bool,
    prep_depth: PrepDepth,
    reason: String,
}

pub struct EventClassifier {
    llm: LlmClient,
}

impl EventClassifier {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// LLM-first, falling back to the deterministic cascade when the LLM
    /// response fails to parse or lands on `unknown` with low confidence.
    pub async fn classify(&self, meeting: &Meeting, user_emails: &HashSet<String>) -> Classification {
        let features = ClassifierFeatures::extract(meeting, user_emails);

        match self.classify_via_llm(meeting, &features).await {
            Some(c) if !(c.event_type == EventType::Unknown && c.confidence == Confidence::Low) => c,
            _ => classify_rules(&features),
        }
    }

    async fn classify_via_llm(&self, meeting: &Meeting, features: &ClassifierFeatures) -> Option<Classification> {
        let prompt = format!(
            "Classify this calendar event. Attendee count: {}, user is organizer: {}, user is attendee: {}, organizer: {}.\n\
             Title: {}\nDescription: {}\n\
             Respond with JSON: {{\"type\": \"meeting|public_event|personal_reminder|leisure|travel|unknown\", \
             \"confidence\": \"low|medium|high\", \"should_prep\": bool, \"prep_depth\": \"full|minimal|none\", \"reason\": string}}",
            features.attendee_count,
            features.user_is_organizer,
            features.user_is_attendee,
            meeting.organizer_email.as_deref().unwrap_or(""),
            meeting.title,
            meeting.description.as_deref().unwrap_or(""),
        );

        let messages = vec![ChatMessage::system("You classify calendar events. Respond with JSON only."), ChatMessage::user(&prompt)];
        let response = self.llm.complete(messages, 300).await.ok()?;
        let value = parse_tolerant(&response)?;
        let parsed: LlmClassification = serde_json::from_value(value).ok()?;

        Some(Classification {
            event_type: parsed.event_type,
            confidence: parsed.confidence,
            should_prep: parsed.should_prep,
            prep_depth: parsed.prep_depth,
            reason: parsed.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attendee;
    use chrono::{Duration, Utc};

    fn meeting(title: &str, attendees: Vec<&str>, organizer: Option<&str>) -> Meeting {
        meeting_with_names(title, attendees.into_iter().map(|e| (e, None)).collect(), organizer)
    }

    fn meeting_with_names(title: &str, attendees: Vec<(&str, Option<&str>)>, organizer: Option<&str>) -> Meeting {
        Meeting {
            id: "m1".into(),
            title: title.into(),
            description: None,
            start: Utc::now(),
            end: Utc::now() + Duration::hours(1),
            organizer_email: organizer.map(String::from),
            attendees: attendees
                .into_iter()
                .map(|(e, name)| Attendee { email: e.into(), display_name: name.map(String::from), response_status: None })
                .collect(),
            timezone: None,
        }
    }

    fn user_emails() -> HashSet<String> {
        HashSet::from(["me@example.com".to_string()])
    }

    #[test]
    fn large_conference_is_public_event() {
        let attendees: Vec<&str> = (0..25).map(|_| "x@other.com").collect();
        let m = meeting("Quarterly All-Hands Conference", attendees, Some("other@corp.com"));
        let features = ClassifierFeatures::extract(&m, &user_emails());
        let c = classify_rules(&features);
        assert_eq!(c.event_type, EventType::PublicEvent);
        assert_eq!(c.prep_depth, PrepDepth::Minimal);
    }

    #[test]
    fn reminder_without_person_is_personal() {
        let m = meeting("Pay rent deadline", vec![], None);
        let features = ClassifierFeatures::extract(&m, &user_emails());
        let c = classify_rules(&features);
        assert_eq!(c.event_type, EventType::PersonalReminder);
        assert_eq!(c.prep_depth, PrepDepth::None);
    }

    #[test]
    fn organizer_gets_full_meeting() {
        let m = meeting("Roadmap sync", vec!["bob@other.com"], Some("me@example.com"));
        let features = ClassifierFeatures::extract(&m, &user_emails());
        let c = classify_rules(&features);
        assert_eq!(c.event_type, EventType::Meeting);
        assert_eq!(c.prep_depth, PrepDepth::Full);
    }

    #[test]
    fn speaker_override_beats_large_conference_rule() {
        let mut attendees: Vec<(&str, Option<&str>)> = (0..49).map(|_| ("x@other.com", None)).collect();
        attendees.push(("me@example.com", Some("Speaker: Bob")));
        let m = meeting_with_names("Annual Industry Conference", attendees, Some("other@corp.com"));
        let features = ClassifierFeatures::extract(&m, &user_emails());
        assert!(features.is_speaker_or_panelist);
        let c = classify_rules(&features);
        assert_eq!(c.event_type, EventType::Meeting);
        assert_eq!(c.prep_depth, PrepDepth::Full);
    }

    #[test]
    fn leisure_keyword_detected() {
        let m = meeting("Birthday party", vec!["bob@other.com"], None);
        let features = ClassifierFeatures::extract(&m, &user_emails());
        let c = classify_rules(&features);
        assert_eq!(c.event_type, EventType::Leisure);
    }

    #[test]
    fn fallback_rule_defaults_to_meeting_low_confidence() {
        let m = meeting("xyz", vec![], None);
        let features = ClassifierFeatures::extract(&m, &user_emails());
        let c = classify_rules(&features);
        assert_eq!(c.event_type, EventType::Meeting);
        assert_eq!(c.confidence, Confidence::Low);
    }
}
