//! Push-notification dispatch seam (spec §6).
//!
//! Transport is explicitly out of scope (§1): the payload shape is fixed,
//! but delivery is behind a trait so a real channel adapter — mirroring the
//! teacher's `channels::{telegram,discord,slack}` senders — can be dropped
//! in without touching call sites. [`LoggingPushSink`] is the only
//! implementation this crate ships.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// `{title, body, data:{type, meeting_id?, ...}}` — opaque to the core
/// beyond `data.type`, which downstream renderers switch on.
#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub data: Value,
}

impl PushPayload {
    pub fn reminder(meeting_id: &str, title: &str, minutes_until: i64) -> Self {
        Self {
            title: format!("Starting in {minutes_until} min"),
            body: title.to_string(),
            data: serde_json::json!({"type": "reminder", "meeting_id": meeting_id}),
        }
    }

    pub fn daily_summary(meeting_count: usize) -> Self {
        Self {
            title: "Today's schedule".to_string(),
            body: format!("{meeting_count} meeting(s) today"),
            data: serde_json::json!({"type": "daily_summary"}),
        }
    }
}

#[async_trait]
pub trait PushSink: Send + Sync {
    async fn send(&self, user_id: &str, payload: PushPayload) -> anyhow::Result<()>;
}

/// No network transport; logs at info level. The default sink when no
/// `push.service_key` is configured (spec §9, "push transport out of scope").
pub struct LoggingPushSink;

#[async_trait]
impl PushSink for LoggingPushSink {
    async fn send(&self, user_id: &str, payload: PushPayload) -> anyhow::Result<()> {
        tracing::info!(user_id, title = %payload.title, body = %payload.body, "push notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_sink_never_fails() {
        let sink = LoggingPushSink;
        let payload = PushPayload::reminder("m1", "Standup", 15);
        assert!(sink.send("u1", payload).await.is_ok());
    }

    #[test]
    fn reminder_payload_carries_meeting_id() {
        let p = PushPayload::reminder("m1", "Standup", 15);
        assert_eq!(p.data["meeting_id"], "m1");
        assert_eq!(p.data["type"], "reminder");
    }
}
