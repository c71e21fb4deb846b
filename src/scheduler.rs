//! Single-process wall-clock scheduler (spec §4.11): hourly per-user checks
//! plus a per-minute reminder sweep, driven by a `tokio::time::interval`
//! tick loop in the teacher's `tokio`-first runtime style. The three
//! cadences it recognizes are expressed as `cron::Schedule`s even though the
//! tick loop itself just checks wall-clock fields each minute — this keeps
//! the cadence definitions declarative and matchable against a given
//! instant without hand-rolled field comparisons creeping back in.

use crate::coordinator::{PrepCoordinator, StreamEvent};
use crate::db::{AccountRepository, BriefRepository, UserRepository};
use crate::domain::{Account, CalendarArtifact, Meeting, User};
use crate::providers::factory::create_provider_clients;
use crate::push::{PushPayload, PushSink};
use crate::token_guard::TokenGuard;
use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const MIDNIGHT_HOUR: u32 = 0;
const DAILY_SUMMARY_HOUR: u32 = 9;
const SWEEP_WINDOW_START_MIN: i64 = 60;
const SWEEP_WINDOW_END_MIN: i64 = 90;
const REMINDER_WINDOW_MIN: i64 = 15;

/// Parsed once at construction; each represents a once-an-hour or
/// once-a-minute cadence. They're never re-evaluated against a moving
/// window — the scheduler still drives off explicit field checks — but
/// keeping them as `cron::Schedule` values documents the three cadences in
/// one place and lets an operator confirm them without reading the tick
/// logic.
pub struct Cadences {
    pub hourly: cron::Schedule,
    pub minutely: cron::Schedule,
}

impl Default for Cadences {
    fn default() -> Self {
        Self {
            hourly: cron::Schedule::from_str("0 0 * * * *").expect("valid hourly cron"),
            minutely: cron::Schedule::from_str("0 * * * * *").expect("valid minutely cron"),
        }
    }
}

pub struct Scheduler {
    users: Arc<dyn UserRepository>,
    accounts: Arc<dyn AccountRepository>,
    briefs: Arc<dyn BriefRepository>,
    token_guard: Arc<TokenGuard>,
    coordinator: Arc<PrepCoordinator>,
    push: Arc<dyn PushSink>,
    cadences: Cadences,
    /// `(user_id, meeting_id)` pairs already reminded today; cleared when
    /// the UTC date rolls over. Reminder dedup is explicitly per-day
    /// (spec §4.11: "deduplicate by meeting id within the day").
    reminded: Mutex<(chrono::NaiveDate, HashSet<(String, String)>)>,
}

impl Scheduler {
    pub fn new(
        users: Arc<dyn UserRepository>,
        accounts: Arc<dyn AccountRepository>,
        briefs: Arc<dyn BriefRepository>,
        token_guard: Arc<TokenGuard>,
        coordinator: Arc<PrepCoordinator>,
        push: Arc<dyn PushSink>,
    ) -> Self {
        Self {
            users,
            accounts,
            briefs,
            token_guard,
            coordinator,
            push,
            cadences: Cadences::default(),
            reminded: Mutex::new((Utc::now().date_naive(), HashSet::new())),
        }
    }

    /// Drives the tick loop until `cancel` fires. A crash/restart re-does at
    /// most the current minute bucket; every downstream write is an upsert,
    /// so duplicate work within a bucket is harmless (spec §4.11).
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let now = Utc::now();
                    if let Err(e) = self.tick(now).await {
                        tracing::error!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }
    }

    async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        if now.minute() == 0 {
            self.hourly(now).await?;
        }
        self.minute_task(now).await?;
        Ok(())
    }

    /// `POST /cron/generate-hourly-briefs` calls this directly (spec §6);
    /// the tick loop calls it once per hour at minute zero.
    pub async fn hourly(&self, now: DateTime<Utc>) -> anyhow::Result<HourlySummary> {
        let mut summary = HourlySummary::default();
        for user in self.users.list_users().await? {
            summary.users_checked += 1;
            let tz = user_timezone(&user);
            let local = now.with_timezone(&tz);

            if local.hour() == MIDNIGHT_HOUR {
                summary.midnight_briefs += self.midnight_batch(&user, now).await?.generated;
            }
            if local.hour() == DAILY_SUMMARY_HOUR {
                self.daily_summary(&user, now).await?;
                summary.daily_summaries += 1;
            }
            summary.sweep_briefs += self.hourly_sweep(&user, now).await?.generated;
        }
        Ok(summary)
    }

    /// Authoritative next-day brief generator (spec §4.11 Open Question):
    /// runs once, at each user's local midnight, over tomorrow's meetings.
    async fn midnight_batch(&self, user: &User, now: DateTime<Utc>) -> anyhow::Result<BatchCounts> {
        let tz = user_timezone(user);
        let local_today = now.with_timezone(&tz).date_naive();
        let tomorrow = local_today.succ_opt().unwrap_or(local_today);
        let after = local_midnight_utc(tomorrow, tz);
        let before = local_midnight_utc(tomorrow.succ_opt().unwrap_or(tomorrow), tz);

        let accounts = self.accounts.list_accounts_for_user(&user.id).await?;
        let meetings = self.fetch_window(&accounts, after, before).await;

        let mut counts = BatchCounts::default();
        for meeting in meetings {
            // "specific start times": all-day events resolve to local
            // midnight with no finer-grained time component.
            if meeting.attendees.is_empty() || meeting.start == after {
                continue;
            }
            if self.briefs.get_brief(&user.id, &meeting.id).await?.is_some() {
                counts.skipped += 1;
                continue;
            }
            self.spawn_prep(user.clone(), accounts.clone(), meeting);
            counts.generated += 1;
        }
        Ok(counts)
    }

    /// Near-term safety net, not a second full generator: covers meetings
    /// the midnight run missed (late invites, newly linked accounts).
    async fn hourly_sweep(&self, user: &User, now: DateTime<Utc>) -> anyhow::Result<BatchCounts> {
        let after = now + Duration::minutes(SWEEP_WINDOW_START_MIN);
        let before = now + Duration::minutes(SWEEP_WINDOW_END_MIN);

        let accounts = self.accounts.list_accounts_for_user(&user.id).await?;
        let meetings = self.fetch_window(&accounts, after, before).await;

        let mut counts = BatchCounts::default();
        for meeting in meetings {
            if meeting.attendees.is_empty() {
                continue;
            }
            if self.briefs.get_brief(&user.id, &meeting.id).await?.is_some() {
                counts.skipped += 1;
                continue;
            }
            self.spawn_prep(user.clone(), accounts.clone(), meeting);
            counts.generated += 1;
        }
        Ok(counts)
    }

    async fn daily_summary(&self, user: &User, now: DateTime<Utc>) -> anyhow::Result<()> {
        let tz = user_timezone(user);
        let local_today = now.with_timezone(&tz).date_naive();
        let after = local_midnight_utc(local_today, tz);
        let before = local_midnight_utc(local_today.succ_opt().unwrap_or(local_today), tz);

        let accounts = self.accounts.list_accounts_for_user(&user.id).await?;
        let meetings = self.fetch_window(&accounts, after, before).await;

        // A chat-log entry is out of scope here: this crate has no chat
        // surface to append to (spec §1 excludes the chat tool-call loop).
        self.push.send(&user.id, PushPayload::daily_summary(meetings.len())).await?;
        Ok(())
    }

    /// `POST /cron/generate-midnight-briefs`.
    pub async fn generate_midnight_briefs(&self, now: DateTime<Utc>) -> anyhow::Result<CronSummary> {
        let mut summary = CronSummary::default();
        for user in self.users.list_users().await? {
            summary.users_checked += 1;
            let counts = self.midnight_batch(&user, now).await?;
            summary.briefs_generated += counts.generated;
            summary.meetings_skipped += counts.skipped;
        }
        Ok(summary)
    }

    /// `POST /cron/generate-daily-briefs` — alias for the hourly sweep,
    /// callable out-of-band (e.g. by an operator backfilling after an
    /// outage).
    pub async fn generate_daily_briefs(&self, now: DateTime<Utc>) -> anyhow::Result<CronSummary> {
        let mut summary = CronSummary::default();
        for user in self.users.list_users().await? {
            summary.users_checked += 1;
            let counts = self.hourly_sweep(&user, now).await?;
            summary.briefs_generated += counts.generated;
            summary.meetings_skipped += counts.skipped;
        }
        Ok(summary)
    }

    /// Per-minute reminder dispatch: meetings starting in the 15th minute
    /// from now, deduplicated per `(user, meeting)` within the UTC day.
    async fn minute_task(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.roll_reminded_if_new_day(now).await;

        for user in self.users.list_users().await? {
            let accounts = self.accounts.list_accounts_for_user(&user.id).await?;
            let after = now + Duration::minutes(REMINDER_WINDOW_MIN);
            let before = after + Duration::minutes(1);
            let meetings = self.fetch_window(&accounts, after, before).await;

            for meeting in meetings {
                let key = (user.id.clone(), meeting.id.clone());
                let mut guard = self.reminded.lock().await;
                if guard.1.contains(&key) {
                    continue;
                }
                guard.1.insert(key);
                drop(guard);

                let payload = PushPayload::reminder(&meeting.id, &meeting.summary, REMINDER_WINDOW_MIN);
                if let Err(e) = self.push.send(&user.id, payload).await {
                    tracing::warn!(user_id = %user.id, meeting_id = %meeting.id, error = %e, "reminder push failed");
                }
            }
        }
        Ok(())
    }

    async fn roll_reminded_if_new_day(&self, now: DateTime<Utc>) {
        let today = now.date_naive();
        let mut guard = self.reminded.lock().await;
        if guard.0 != today {
            *guard = (today, HashSet::new());
        }
    }

    /// Fetches calendar events in `[after, before)` across every one of the
    /// user's accounts, failing one account never blocking another (spec
    /// §4.11), deduped by event id.
    async fn fetch_window(&self, accounts: &[Account], after: DateTime<Utc>, before: DateTime<Utc>) -> Vec<CalendarArtifact> {
        let mut all = Vec::new();
        for account in accounts {
            let refreshed = match self.token_guard.ensure_valid(account).await {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(account_id = %account.id, error = %e, "scheduler token refresh failed");
                    continue;
                }
            };
            let clients = match create_provider_clients(&refreshed) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(account_id = %account.id, error = %e, "scheduler provider setup failed");
                    continue;
                }
            };
            match clients.calendar.list_events(after, before, 100).await {
                Ok(events) => all.extend(events),
                Err(e) => tracing::warn!(account_id = %account.id, error = %e, "scheduler calendar fetch failed"),
            }
        }
        let mut seen = HashSet::new();
        all.retain(|e| seen.insert(e.id.clone()));
        all
    }

    /// Fire-and-forget: drains the coordinator's stream so the brief
    /// persists, without blocking the scheduler tick on one user's prep.
    fn spawn_prep(&self, user: User, accounts: Vec<Account>, calendar_event: CalendarArtifact) {
        let coordinator = self.coordinator.clone();
        let meeting = Meeting {
            id: calendar_event.id,
            title: calendar_event.summary,
            description: None,
            start: calendar_event.start,
            end: calendar_event.end,
            organizer_email: None,
            attendees: calendar_event.attendees.clone(),
            timezone: None,
        };
        let attendees = calendar_event.attendees;
        tokio::spawn(async move {
            let mut rx = coordinator.run(meeting.clone(), attendees, user.clone(), accounts, CancellationToken::new());
            while let Some(event) = rx.recv().await {
                if let StreamEvent::Error { payload } = event {
                    tracing::warn!(user_id = %user.id, meeting_id = %meeting.id, error = %payload.message, "scheduled prep failed");
                }
            }
        });
    }
}

/// Per-user tally from one batch pass, before it's folded into the caller's
/// running summary.
#[derive(Debug, Default, Clone, Copy)]
struct BatchCounts {
    generated: usize,
    skipped: usize,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct HourlySummary {
    pub users_checked: usize,
    pub midnight_briefs: usize,
    pub daily_summaries: usize,
    pub sweep_briefs: usize,
}

/// `{users_checked, briefs_generated, meetings_skipped}` — the idempotent
/// cron-endpoint response shape (spec §6).
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct CronSummary {
    pub users_checked: usize,
    pub briefs_generated: usize,
    pub meetings_skipped: usize,
}

fn user_timezone(user: &User) -> chrono_tz::Tz {
    user.timezone.parse().unwrap_or(chrono_tz::UTC)
}

fn local_midnight_utc(date: chrono::NaiveDate, tz: chrono_tz::Tz) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN)
        .and_local_timezone(tz)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cadences_parse() {
        let cadences = Cadences::default();
        assert!(cadences.hourly.upcoming(Utc).next().is_some());
        assert!(cadences.minutely.upcoming(Utc).next().is_some());
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let user = User { id: "u1".into(), email: "a@x.com".into(), emails: vec![], name: "A".into(), timezone: "Not/AZone".into() };
        assert_eq!(user_timezone(&user), chrono_tz::UTC);
    }

    #[test]
    fn local_midnight_is_midnight_in_utc_for_utc_zone() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let dt = local_midnight_utc(date, chrono_tz::UTC);
        assert_eq!(dt.format("%H:%M:%S").to_string(), "00:00:00");
    }
}
