//! HTTP surface (spec §6): the prep stream, day-prep, purpose-detection,
//! and cron endpoints, built as an `axum::Router` over one shared
//! [`AppState`]. Auth follows the teacher's bearer-middleware pattern
//! (`require_bearer` in `a2a/server.rs`), generalized to also accept a
//! session cookie per the spec's "session cookie or bearer" wording.

mod routes;
mod state;

pub use state::AppState;

use axum::{
    Router,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

const SESSION_COOKIE_NAME: &str = "brieflock_session";

/// Skipped entirely when no `server.api_key` is configured, matching the
/// teacher's `require_bearer`.
async fn require_auth(State(state): State<AppState>, req: Request<axum::body::Body>, next: Next) -> Response {
    let Some(ref expected) = state.api_key else {
        return next.run(req).await;
    };

    let bearer_ok = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected);

    let cookie_ok = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|cookies| {
            cookies.split(';').map(str::trim).any(|kv| kv == format!("{SESSION_COOKIE_NAME}={expected}"))
        });

    if bearer_ok || cookie_ok {
        next.run(req).await
    } else {
        let body = serde_json::json!({
            "status": 401,
            "error": "UNAUTHORIZED",
            "message": "missing or invalid bearer token / session cookie",
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    let protected = Router::new()
        .route("/prep", post(routes::prep))
        .route("/day-prep/{date}", get(routes::day_prep))
        .route("/purpose", post(routes::purpose))
        .route("/cron/generate-hourly-briefs", post(routes::cron_hourly))
        .route("/cron/generate-midnight-briefs", post(routes::cron_midnight))
        .route("/cron/generate-daily-briefs", post(routes::cron_daily))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": crate::VERSION }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_is_always_public() {
        let state = state::test_helpers::empty_state(None).await;
        let app = build_router(state);
        let req = HttpRequest::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_rejects_missing_token() {
        let state = state::test_helpers::empty_state(Some("secret".to_string())).await;
        let app = build_router(state);
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/cron/generate-hourly-briefs")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_route_accepts_bearer_token() {
        let state = state::test_helpers::empty_state(Some("secret".to_string())).await;
        let app = build_router(state);
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/cron/generate-hourly-briefs")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
