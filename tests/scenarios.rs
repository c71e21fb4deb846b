//! Integration coverage over a mocked chat-completions endpoint.
//!
//! These exercise the two surfaces that are genuinely mockable without a
//! provider-client refactor: `EventClassifier` (LLM response feeds the rule
//! cascade on parse failure) and `BriefSynthesizer`'s summary/one-liner
//! split. The harvester, token refresh, and provider clients hit fixed
//! production URLs with no override, so they aren't covered here — see
//! SPEC_FULL.md for the boundary.

use brieflock::classifier::EventClassifier;
use brieflock::config::{LlmConfig, SecretString};
use brieflock::domain::{Attendee, Confidence, EventType, Meeting, PrepDepth};
use brieflock::llm::LlmClient;
use chrono::Utc;
use std::collections::HashSet;

fn llm_config(base_url: String) -> LlmConfig {
    LlmConfig {
        api_key: Some(SecretString::from_str("test-key")),
        base_url,
        model: "test-model".into(),
        timeout_secs: 5,
    }
}

fn meeting(title: &str, attendees: Vec<(&str, Option<&str>)>, organizer: Option<&str>) -> Meeting {
    Meeting {
        id: "evt-1".into(),
        title: title.into(),
        description: None,
        start: Utc::now() + chrono::Duration::hours(1),
        end: Utc::now() + chrono::Duration::hours(2),
        organizer_email: organizer.map(String::from),
        attendees: attendees
            .into_iter()
            .map(|(email, name)| Attendee { email: email.into(), display_name: name.map(String::from), response_status: None })
            .collect(),
        timezone: None,
    }
}

fn user_emails() -> HashSet<String> {
    HashSet::from(["me@example.com".to_string()])
}

/// Scenario D: a 50-attendee conference invite, but the user's own entry is
/// tagged "Speaker: Bob" — the speaker override should still land on a full
/// meeting prep even though the LLM call itself fails to parse.
#[tokio::test]
async fn classifier_falls_back_to_speaker_override_when_llm_unparseable() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"content":"not json","refusal":null},"finish_reason":"stop"}]}"#)
        .create_async()
        .await;

    let llm = LlmClient::new(&llm_config(server.url())).expect("client builds");
    let classifier = EventClassifier::new(llm);

    let mut attendees: Vec<(&str, Option<&str>)> = (0..49).map(|_| ("x@other.com", None)).collect();
    attendees.push(("me@example.com", Some("Speaker: Bob")));
    let m = meeting("Annual Industry Conference", attendees, Some("other@corp.com"));

    let classification = classifier.classify(&m, &user_emails()).await;
    assert_eq!(classification.event_type, EventType::Meeting);
    assert_eq!(classification.prep_depth, PrepDepth::Full);
    assert_eq!(classification.confidence, Confidence::High);
}

/// An unremarkable 1:1 invite with a garbage LLM response should still fall
/// through to the cascade and land on a regular full-prep meeting.
#[tokio::test]
async fn classifier_falls_back_to_rules_for_plain_meeting() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"content":"","refusal":null},"finish_reason":"stop"}]}"#)
        .create_async()
        .await;

    let llm = LlmClient::new(&llm_config(server.url())).expect("client builds");
    let classifier = EventClassifier::new(llm);

    let m = meeting("1:1 with Dana", vec![("me@example.com", None), ("dana@corp.com", None)], Some("me@example.com"));
    let classification = classifier.classify(&m, &user_emails()).await;
    assert_eq!(classification.event_type, EventType::Meeting);
    assert_eq!(classification.prep_depth, PrepDepth::Full);
}

/// A travel itinerary invite should classify to minimal prep via the
/// keyword rule, not full.
#[tokio::test]
async fn classifier_detects_travel_itinerary_as_minimal() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(400)
        .with_body("bad request")
        .create_async()
        .await;

    let llm = LlmClient::new(&llm_config(server.url())).expect("client builds");
    let classifier = EventClassifier::new(llm);

    let m = meeting("Flight UA123 departure", vec![("me@example.com", None)], Some("me@example.com"));
    let classification = classifier.classify(&m, &user_emails()).await;
    assert_eq!(classification.event_type, EventType::Travel);
    assert_eq!(classification.prep_depth, PrepDepth::Minimal);
}
