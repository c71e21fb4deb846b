//! Tool-call schema (spec §6): the structured operations the chat surface
//! can invoke. The conversational tool-call loop itself is out of scope
//! (spec §1) — this module specifies each tool's JSON schema and implements
//! its execution against the real pipeline components, for a caller-owned
//! loop to dispatch into.

use crate::attendee_research::WebSearchClient;
use crate::coordinator::{PrepCoordinator, StreamEvent};
use crate::db::BriefRepository;
use crate::domain::{Account, Attendee, Meeting, User};
use crate::providers::CalendarClient;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Every tool result carries `warnings[]` so partial failures (a
/// sub-fetch that failed, a search provider that degraded) surface without
/// aborting the call (spec §6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolResult {
    pub data: Value,
    pub warnings: Vec<String>,
}

impl ToolResult {
    fn ok(data: Value) -> Self {
        Self { data, warnings: Vec::new() }
    }
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_calendar_by_date",
            description: "List a user's calendar events on a single date.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "date": { "type": "string", "description": "YYYY-MM-DD" } },
                "required": ["date"]
            }),
        },
        ToolDefinition {
            name: "list_calendar_events",
            description: "List calendar events in a window, or on a single date.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "start_iso": { "type": "string" },
                    "end_iso": { "type": "string" },
                    "date": { "type": "string" },
                    "timezone": { "type": "string", "description": "IANA zone, default UTC" },
                    "limit": { "type": "integer" }
                }
            }),
        },
        ToolDefinition {
            name: "get_calendar_event",
            description: "Fetch a single calendar event by id.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "event_id": { "type": "string" },
                    "timezone": { "type": "string" }
                },
                "required": ["event_id"]
            }),
        },
        ToolDefinition {
            name: "generate_meeting_brief",
            description: "Generate (or fetch, if already generated) the prep brief for a meeting.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "meeting_id": { "type": "string" },
                    "meeting": { "type": "object" }
                }
            }),
        },
        ToolDefinition {
            name: "parallel_search",
            description: "Run several web searches concurrently toward one research objective.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "objective": { "type": "string" },
                    "search_queries": { "type": "array", "items": { "type": "string" } },
                    "max_results": { "type": "integer" },
                    "max_chars_per_result": { "type": "integer" }
                },
                "required": ["objective", "search_queries"]
            }),
        },
    ]
}

pub async fn get_calendar_by_date(calendar: &dyn CalendarClient, date: NaiveDate, tz: Tz) -> anyhow::Result<ToolResult> {
    let after = day_start(date, tz);
    let before = day_start(date.succ_opt().unwrap_or(date), tz);
    let events = calendar.list_events(after, before, 250).await?;
    Ok(ToolResult::ok(serde_json::to_value(events)?))
}

pub async fn list_calendar_events(
    calendar: &dyn CalendarClient,
    start_iso: Option<String>,
    end_iso: Option<String>,
    date: Option<String>,
    timezone: Option<String>,
    limit: Option<usize>,
) -> anyhow::Result<ToolResult> {
    let mut warnings = Vec::new();
    let tz = resolve_tz(timezone.as_deref(), &mut warnings);

    let (after, before) = if let Some(d) = date {
        let parsed = NaiveDate::parse_from_str(&d, "%Y-%m-%d")?;
        (day_start(parsed, tz), day_start(parsed.succ_opt().unwrap_or(parsed), tz))
    } else {
        let after = start_iso.as_deref().map(DateTime::parse_from_rfc3339).transpose()?.map(|d| d.with_timezone(&Utc)).unwrap_or_else(Utc::now);
        let before = end_iso.as_deref().map(DateTime::parse_from_rfc3339).transpose()?.map(|d| d.with_timezone(&Utc)).unwrap_or_else(|| after + chrono::Duration::days(7));
        (after, before)
    };

    let events = calendar.list_events(after, before, limit.unwrap_or(100)).await?;
    Ok(ToolResult { data: serde_json::to_value(events)?, warnings })
}

pub async fn get_calendar_event(calendar: &dyn CalendarClient, event_id: &str, timezone: Option<String>) -> anyhow::Result<ToolResult> {
    let mut warnings = Vec::new();
    let _tz = resolve_tz(timezone.as_deref(), &mut warnings);

    // No single-event provider endpoint is wrapped; narrow the lookback
    // window and filter client-side instead of adding a second call shape.
    let after = Utc::now() - chrono::Duration::days(365);
    let before = Utc::now() + chrono::Duration::days(365);
    let events = calendar.list_events(after, before, 2500).await?;
    match events.into_iter().find(|e| e.id == event_id) {
        Some(event) => Ok(ToolResult { data: serde_json::to_value(event)?, warnings }),
        None => {
            warnings.push(format!("event {event_id} not found in the searched window"));
            Ok(ToolResult { data: Value::Null, warnings })
        }
    }
}

pub async fn generate_meeting_brief(
    coordinator: Arc<PrepCoordinator>,
    briefs: &dyn BriefRepository,
    user: User,
    accounts: Vec<Account>,
    meeting: Meeting,
    attendees: Vec<Attendee>,
) -> anyhow::Result<ToolResult> {
    if let Some(existing) = briefs.get_brief(&user.id, &meeting.id).await? {
        return Ok(ToolResult::ok(existing));
    }

    let meeting_id = meeting.id.clone();
    let user_id = user.id.clone();
    let mut rx = coordinator.run(meeting, attendees, user, accounts, CancellationToken::new());

    let mut warnings = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Complete { brief } => return Ok(ToolResult { data: serde_json::to_value(*brief)?, warnings }),
            StreamEvent::Error { payload } => {
                warnings.push(payload.message.clone());
                return Ok(ToolResult { data: Value::Null, warnings });
            }
            _ => {}
        }
    }

    warnings.push(format!("brief generation for meeting {meeting_id} (user {user_id}) ended without a terminal event"));
    Ok(ToolResult { data: Value::Null, warnings })
}

pub async fn parallel_search(
    web_search: &dyn WebSearchClient,
    objective: &str,
    queries: &[String],
    max_results: Option<usize>,
    max_chars_per_result: Option<usize>,
) -> anyhow::Result<ToolResult> {
    let cap = max_results.unwrap_or(5);
    let char_cap = max_chars_per_result.unwrap_or(500);

    let results = futures::future::join_all(queries.iter().map(|q| web_search.search(q))).await;

    let mut warnings = Vec::new();
    let mut merged = Vec::new();
    for (query, result) in queries.iter().zip(results) {
        match result {
            Ok(hits) => merged.extend(hits.into_iter().take(cap).map(|h| {
                serde_json::json!({
                    "query": query,
                    "title": h.title,
                    "url": h.url,
                    "excerpt": h.excerpt.chars().take(char_cap).collect::<String>(),
                })
            })),
            Err(e) => warnings.push(format!("query \"{query}\" failed: {e}")),
        }
    }

    Ok(ToolResult { data: serde_json::json!({"objective": objective, "results": merged}), warnings })
}

fn resolve_tz(timezone: Option<&str>, warnings: &mut Vec<String>) -> Tz {
    match timezone {
        Some(tz) => tz.parse().unwrap_or_else(|_| {
            warnings.push(format!("unrecognized timezone \"{tz}\", defaulting to UTC"));
            Tz::UTC
        }),
        None => Tz::UTC,
    }
}

fn day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(tz).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definitions_cover_the_five_spec_operations() {
        let names: Vec<&str> = tool_definitions().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["get_calendar_by_date", "list_calendar_events", "get_calendar_event", "generate_meeting_brief", "parallel_search"]);
    }

    #[test]
    fn unrecognized_timezone_warns_and_falls_back() {
        let mut warnings = Vec::new();
        let tz = resolve_tz(Some("Not/AZone"), &mut warnings);
        assert_eq!(tz, Tz::UTC);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn day_start_is_midnight_utc_for_utc_zone() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let start = day_start(date, Tz::UTC);
        assert_eq!(start.format("%H:%M:%S").to_string(), "00:00:00");
    }
}
