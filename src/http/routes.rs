use super::AppState;
use crate::db::{AccountRepository, BriefRepository, UserRepository};
use crate::domain::{Attendee, Meeting};
use crate::error::ErrorPayload;
use crate::providers::factory::create_provider_clients;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PrepRequest {
    meeting: Meeting,
    #[serde(default)]
    attendees: Vec<Attendee>,
    user_id: String,
}

/// `POST /prep` — streams one JSON object per line (spec §6: bare ndjson,
/// not SSE; the same [`StreamEvent`] channel the coordinator produces
/// internally, with only the HTTP framing differing from the teacher's
/// `message/stream`).
pub async fn prep(State(state): State<AppState>, Json(req): Json<PrepRequest>) -> Response {
    let user = match state.repo.get_user(&req.user_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return not_found(&format!("user {} not found", req.user_id)),
        Err(e) => return internal_error(e),
    };
    let accounts = match state.repo.list_accounts_for_user(&user.id).await {
        Ok(a) => a,
        Err(e) => return internal_error(e),
    };

    let rx = state
        .coordinator
        .clone()
        .run(req.meeting, req.attendees, user, accounts, tokio_util::sync::CancellationToken::new());

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(|event| {
        let mut line = serde_json::to_string(&event).unwrap_or_default();
        line.push('\n');
        Ok::<_, std::io::Error>(line)
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|e| internal_error(e))
}

#[derive(Debug, Deserialize)]
pub struct DayPrepQuery {
    user_id: String,
}

#[derive(Debug, Serialize)]
pub struct DayPrepResponse {
    date: String,
    meetings: Vec<Meeting>,
    prep_results: Vec<serde_json::Value>,
    day_prep: crate::day_prep::DayPrep,
}

/// `GET /day-prep/{date}?user_id=...` (spec §6). The endpoint's auth model
/// doesn't specify how a session cookie resolves to a user id — out of
/// scope alongside the rest of the chat/session surface (§1) — so the
/// caller supplies `user_id` explicitly here.
pub async fn day_prep(State(state): State<AppState>, Path(date): Path<String>, Query(q): Query<DayPrepQuery>) -> Response {
    let parsed_date = match chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => return bad_request("date must be YYYY-MM-DD"),
    };

    let user = match state.repo.get_user(&q.user_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return not_found(&format!("user {} not found", q.user_id)),
        Err(e) => return internal_error(e),
    };
    let tz: chrono_tz::Tz = user.timezone.parse().unwrap_or(chrono_tz::UTC);
    let after = parsed_date
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(tz).earliest())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now);
    let before = after + chrono::Duration::days(1);

    let accounts = match state.repo.list_accounts_for_user(&user.id).await {
        Ok(a) => a,
        Err(e) => return internal_error(e),
    };

    let mut meetings = Vec::new();
    for account in &accounts {
        let Ok(refreshed) = state.token_guard.ensure_valid(account).await else { continue };
        let Ok(clients) = create_provider_clients(&refreshed) else { continue };
        let Ok(events) = clients.calendar.list_events(after, before, 100).await else { continue };
        for event in events {
            meetings.push(Meeting {
                id: event.id,
                title: event.summary,
                description: None,
                start: event.start,
                end: event.end,
                organizer_email: None,
                attendees: event.attendees,
                timezone: None,
            });
        }
    }
    meetings.sort_by_key(|m| m.start);

    let mut prep_results = Vec::with_capacity(meetings.len());
    let mut briefs = Vec::with_capacity(meetings.len());
    for meeting in &meetings {
        match state.repo.get_brief(&user.id, &meeting.id).await {
            Ok(Some(existing)) => {
                if let Ok(brief) = serde_json::from_value::<crate::domain::Brief>(existing.clone()) {
                    briefs.push(brief);
                }
                prep_results.push(existing);
            }
            Ok(None) => prep_results.push(serde_json::json!({"meetingId": meeting.id, "status": "pending"})),
            Err(e) => prep_results.push(serde_json::json!({"meetingId": meeting.id, "status": "error", "message": e.to_string()})),
        }
    }

    let day_prep = state.day_prep.aggregate(&user.name, &date, &briefs).await;

    Json(DayPrepResponse { date, meetings, prep_results, day_prep }).into_response()
}

#[derive(Debug, Deserialize)]
pub struct PurposeRequest {
    meeting: Meeting,
    #[serde(default)]
    attendees: Vec<Attendee>,
}

/// `POST /purpose` (spec §6). Runs purpose detection directly against the
/// submitted meeting, without harvested email evidence — callers that want
/// evidence-grounded purpose detection should go through `/prep` instead.
pub async fn purpose(State(state): State<AppState>, Json(req): Json<PurposeRequest>) -> Response {
    let attendee_names: Vec<String> = req.attendees.iter().filter_map(|a| a.display_name.clone()).collect();
    let attendee_emails: Vec<String> = req.attendees.iter().map(|a| a.email.clone()).collect();
    let result = state.purpose_detector.detect(&req.meeting, &attendee_names, &[], &attendee_emails).await;
    Json(result).into_response()
}

pub async fn cron_hourly(State(state): State<AppState>) -> Response {
    match state.scheduler.hourly(chrono::Utc::now()).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn cron_midnight(State(state): State<AppState>) -> Response {
    match state.scheduler.generate_midnight_briefs(chrono::Utc::now()).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn cron_daily(State(state): State<AppState>) -> Response {
    match state.scheduler.generate_daily_briefs(chrono::Utc::now()).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal_error(e),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({"status": 400, "error": "BAD_REQUEST", "message": message}))).into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"status": 404, "error": "NOT_FOUND", "message": message}))).into_response()
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    let payload = ErrorPayload {
        status: 500,
        error: crate::error::ErrorCode::Internal,
        message: err.to_string(),
        request_id: Uuid::new_v4().to_string(),
        revoked: None,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
