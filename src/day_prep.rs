//! DayPrepAggregator (spec §4.9): cross-meeting theme/conflict/dependency
//! detection over a day's briefs, plus the spoken-brief narrative stage.

use crate::domain::Brief;
use crate::llm::{ChatMessage, LlmClient, json::parse_tolerant};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, serde::Serialize)]
pub struct OverlapTable {
    pub by_person: HashMap<String, usize>,
    pub by_topic: HashMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Conflict {
    pub kind: String,
    pub description: String,
    pub meeting_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Theme {
    pub name: String,
    pub meeting_ids: Vec<String>,
    pub significance: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Dependency {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub meeting_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SpokenBrief {
    pub orientation: String,
    pub morning: String,
    pub midday: String,
    pub afternoon: String,
    pub win_condition: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DayPrep {
    pub overlaps: OverlapTable,
    pub conflicts: Vec<Conflict>,
    pub themes: Vec<Theme>,
    pub dependencies: Vec<Dependency>,
    pub spoken_brief: SpokenBrief,
}

const MARKERS: [(&str, &str); 5] = [
    ("ORIENTATION", "MORNING"),
    ("MORNING", "MIDDAY"),
    ("MIDDAY", "AFTERNOON"),
    ("AFTERNOON", "WIN_CONDITION"),
    ("WIN_CONDITION", ""),
];

pub struct DayPrepAggregator {
    llm: LlmClient,
}

impl DayPrepAggregator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub async fn aggregate(&self, user_name: &str, date: &str, briefs: &[Brief]) -> DayPrep {
        let overlaps = compute_overlaps(briefs);
        let conflicts = self.detect_conflicts(briefs).await;
        let themes = self.detect_themes(briefs).await;
        let dependencies = self.detect_dependencies(briefs).await;
        let spoken_brief = self.spoken_brief(user_name, date, briefs, &themes, &conflicts).await;

        DayPrep { overlaps, conflicts, themes, dependencies, spoken_brief }
    }

    async fn detect_conflicts(&self, briefs: &[Brief]) -> Vec<Conflict> {
        if briefs.len() < 2 {
            return Vec::new();
        }
        let listing = brief_listing(briefs);
        let prompt = format!(
            "Scan these same-day meeting briefs for status/priority/decision/timeline/resource contradictions between them.\n{listing}\n\
             Respond with JSON array: [{{\"kind\": string, \"description\": string, \"meeting_ids\": [string]}}]"
        );
        self.list_or_empty(prompt, "You detect cross-meeting contradictions.").await
    }

    async fn detect_themes(&self, briefs: &[Brief]) -> Vec<Theme> {
        if briefs.len() < 2 {
            return Vec::new();
        }
        let listing = brief_listing(briefs);
        let prompt = format!(
            "Identify threads connecting two or more of these meetings, with a significance tag (low/medium/high).\n{listing}\n\
             Respond with JSON array: [{{\"name\": string, \"meeting_ids\": [string], \"significance\": string}}]"
        );
        self.list_or_empty(prompt, "You identify cross-meeting themes.").await
    }

    async fn detect_dependencies(&self, briefs: &[Brief]) -> Vec<Dependency> {
        if briefs.len() < 2 {
            return Vec::new();
        }
        let listing = brief_listing(briefs);
        let prompt = format!(
            "Suggest a sequencing between these meetings where one depends on another, typed as decision/information/approval/preparation.\n{listing}\n\
             Respond with JSON array: [{{\"description\": string, \"type\": string, \"meeting_ids\": [string]}}]"
        );
        self.list_or_empty(prompt, "You identify cross-meeting sequencing dependencies.").await
    }

    async fn list_or_empty<T: for<'de> Deserialize<'de>>(&self, prompt: String, system: &'static str) -> Vec<T> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(&prompt)];
        let response = match self.llm.complete(messages, 900).await {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };
        parse_tolerant(&response).and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default()
    }

    async fn spoken_brief(&self, user_name: &str, date: &str, briefs: &[Brief], themes: &[Theme], conflicts: &[Conflict]) -> SpokenBrief {
        let attendee_hints: Vec<String> = briefs.iter().flat_map(|b| b.attendees.iter().filter_map(|a| a.display_name.clone())).collect();
        let listing = brief_listing(briefs);
        let theme_summary = themes.iter().map(|t| t.name.clone()).collect::<Vec<_>>().join(", ");
        let conflict_summary = conflicts.iter().map(|c| c.description.clone()).collect::<Vec<_>>().join("; ");

        let prompt = format!(
            "Write a 750-1000 word spoken brief for {user_name} covering {date}, for text-to-speech playback. \
             Use attendee names naturally for pronunciation where given: {}.\n\
             Cross-meeting themes: {theme_summary}\nConflicts to flag: {conflict_summary}\nMeetings:\n{listing}\n\n\
             Structure the response with these exact markers on their own lines: ORIENTATION, MORNING, MIDDAY, AFTERNOON, WIN_CONDITION.",
            attendee_hints.join(", ")
        );
        let messages = vec![ChatMessage::system("You write orientation-style spoken day briefs."), ChatMessage::user(&prompt)];

        let response = self.llm.complete(messages, 1800).await.unwrap_or_default();
        extract_spoken_sections(&response)
    }
}

fn brief_listing(briefs: &[Brief]) -> String {
    briefs.iter().map(|b| format!("[{}] {} — {}", b.meeting_id, b.summary, b.purpose)).collect::<Vec<_>>().join("\n")
}

fn compute_overlaps(briefs: &[Brief]) -> OverlapTable {
    let mut by_person = HashMap::new();
    let mut by_topic = HashMap::new();

    for brief in briefs {
        for attendee in &brief.attendees {
            *by_person.entry(attendee.email.to_ascii_lowercase()).or_insert(0) += 1;
        }
        for item in &brief.agenda {
            *by_topic.entry(item.clone()).or_insert(0) += 1;
        }
    }

    OverlapTable { by_person, by_topic }
}

/// Extracts the five marker-delimited sections; a missing marker degrades
/// to an empty section rather than failing the whole brief.
fn extract_spoken_sections(text: &str) -> SpokenBrief {
    let find = |marker: &str| text.find(marker).map(|i| i + marker.len());

    let mut result = SpokenBrief::default();
    for (marker, next_marker) in MARKERS {
        let Some(start) = find(marker) else { continue };
        let end = if next_marker.is_empty() { text.len() } else { text[start..].find(next_marker).map(|i| start + i).unwrap_or(text.len()) };
        let section = text[start..end].trim().trim_start_matches(':').trim().to_string();
        match marker {
            "ORIENTATION" => result.orientation = section,
            "MORNING" => result.morning = section,
            "MIDDAY" => result.midday = section,
            "AFTERNOON" => result.afternoon = section,
            "WIN_CONDITION" => result.win_condition = section,
            _ => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attendee;

    fn brief(meeting_id: &str, attendees: Vec<&str>) -> Brief {
        Brief {
            meeting_id: meeting_id.into(),
            attendees: attendees.into_iter().map(|e| Attendee { email: e.into(), display_name: None, response_status: None }).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn overlaps_count_shared_attendees() {
        let briefs = vec![brief("m1", vec!["a@x.com", "b@x.com"]), brief("m2", vec!["a@x.com"])];
        let overlaps = compute_overlaps(&briefs);
        assert_eq!(overlaps.by_person.get("a@x.com"), Some(&2));
        assert_eq!(overlaps.by_person.get("b@x.com"), Some(&1));
    }

    #[test]
    fn spoken_sections_extracted_by_marker() {
        let text = "ORIENTATION\nGood morning.\nMORNING\nFirst meeting.\nMIDDAY\nLunch review.\nAFTERNOON\nWrap up.\nWIN_CONDITION\nShip it.";
        let sections = extract_spoken_sections(text);
        assert_eq!(sections.orientation, "Good morning.");
        assert_eq!(sections.win_condition, "Ship it.");
    }

    #[test]
    fn missing_marker_yields_empty_section() {
        let text = "ORIENTATION\nGood morning.\nMIDDAY\nLunch.";
        let sections = extract_spoken_sections(text);
        assert_eq!(sections.orientation, "Good morning.");
        assert_eq!(sections.morning, "");
    }
}
