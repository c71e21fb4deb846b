//! Fan-out across all valid accounts in parallel; merges & deduplicates
//! emails, documents, calendar events; caps lookback windows (spec §4.3).

mod dedup;
pub mod keywords;

use crate::domain::{Account, Attendee, CalendarArtifact, DocumentArtifact, EmailArtifact, Meeting};
use crate::providers::factory::create_provider_clients;
use crate::token_guard::TokenGuard;
use chrono::{DateTime, Duration, Utc};
use dedup::dedup_by_id;
use std::sync::Arc;

const EMAIL_DOC_LOOKBACK_DAYS: i64 = 730;
const CALENDAR_LOOKBACK_DAYS: i64 = 180;

#[derive(Debug, Clone, Default)]
pub struct AccountStats {
    pub total_accounts: usize,
    pub successful_accounts: usize,
    pub failed_accounts: Vec<String>,
}

impl AccountStats {
    pub fn partial_failure(&self) -> bool {
        !self.failed_accounts.is_empty() && self.successful_accounts > 0
    }

    pub fn all_failed(&self) -> bool {
        self.total_accounts > 0 && self.successful_accounts == 0
    }
}

pub struct HarvestResult<T> {
    pub items: Vec<T>,
    pub stats: AccountStats,
}

pub struct MultiAccountHarvester {
    token_guard: Arc<TokenGuard>,
}

impl MultiAccountHarvester {
    pub fn new(token_guard: Arc<TokenGuard>) -> Self {
        Self { token_guard }
    }

    /// Build the Gmail-style disjunctive query for one meeting (spec §4.3).
    /// Degrades to keyword-only when there are no attendees; returns `None`
    /// if neither attendees nor keywords exist (the zero-attendee boundary).
    fn build_email_query(meeting: &Meeting, attendees: &[Attendee]) -> Option<String> {
        let keywords = keywords::extract_keywords(&meeting.title, meeting.description.as_deref());

        let mut clauses = Vec::new();

        if !attendees.is_empty() {
            let address_clause = attendees
                .iter()
                .map(|a| format!("(from:{0} OR to:{0})", a.email))
                .collect::<Vec<_>>()
                .join(" OR ");
            clauses.push(format!("({address_clause})"));

            let domains: std::collections::HashSet<String> = attendees
                .iter()
                .filter_map(|a| a.email.split('@').nth(1).map(|d| d.to_string()))
                .collect();
            if !domains.is_empty() {
                let domain_clause =
                    domains.iter().map(|d| format!("from:*@{d}")).collect::<Vec<_>>().join(" OR ");
                clauses.push(format!("({domain_clause})"));
            }
        }

        if !keywords.is_empty() {
            let keyword_clause = keywords
                .iter()
                .map(|k| format!("(subject:{k} OR {k})"))
                .collect::<Vec<_>>()
                .join(" OR ");
            clauses.push(format!("({keyword_clause})"));
        }

        if clauses.is_empty() {
            return None;
        }

        let after = (meeting.start - Duration::days(EMAIL_DOC_LOOKBACK_DAYS)).format("%Y/%m/%d");
        let before = (meeting.start + Duration::days(1)).format("%Y/%m/%d");
        Some(format!("({}) after:{after} before:{before}", clauses.join(" OR ")))
    }

    fn build_drive_query(meeting: &Meeting, attendees: &[Attendee]) -> Option<String> {
        if attendees.is_empty() {
            return None;
        }
        let clause = attendees
            .iter()
            .map(|a| format!("('{0}' in readers or '{0}' in writers)", a.email))
            .collect::<Vec<_>>()
            .join(" or ");
        let after = meeting.start - Duration::days(EMAIL_DOC_LOOKBACK_DAYS);
        Some(format!(
            "({clause}) and modifiedTime > '{}' and modifiedTime < '{}'",
            after.to_rfc3339(),
            meeting.start.to_rfc3339()
        ))
    }

    /// `fetch_emails` — spec §4.3. Zero-attendee boundary: degrades to
    /// keyword-only, or succeeds with an empty set if no keywords either.
    pub async fn fetch_emails(
        &self,
        accounts: &[Account],
        meeting: &Meeting,
        attendees: &[Attendee],
    ) -> HarvestResult<EmailArtifact> {
        let query = match Self::build_email_query(meeting, attendees) {
            Some(q) => q,
            None => {
                return HarvestResult {
                    items: Vec::new(),
                    stats: AccountStats { total_accounts: accounts.len(), successful_accounts: accounts.len(), failed_accounts: vec![] },
                };
            }
        };

        let mut all = Vec::new();
        let mut stats = AccountStats { total_accounts: accounts.len(), ..Default::default() };

        for account in accounts {
            match self.fetch_emails_for_account(account, &query).await {
                Ok(mut emails) => {
                    stats.successful_accounts += 1;
                    all.append(&mut emails);
                }
                Err(e) => {
                    tracing::warn!(account_id = %account.id, error = %e, "email harvest failed for account");
                    stats.failed_accounts.push(account.id.clone());
                }
            }
        }

        // Post-fetch filter: no artifact dated after the meeting.
        all.retain(|e: &EmailArtifact| e.date <= meeting.start);
        let deduped = dedup_by_id(all, |e| e.id.as_str());

        HarvestResult { items: deduped, stats }
    }

    async fn fetch_emails_for_account(&self, account: &Account, query: &str) -> anyhow::Result<Vec<EmailArtifact>> {
        let refreshed = self.token_guard.ensure_valid(account).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let clients = create_provider_clients(&refreshed)?;
        let ids = clients.mail.list(query, 100).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(clients.mail.fetch(&id).await?);
        }
        Ok(out)
    }

    /// `fetch_files` — spec §4.3.
    pub async fn fetch_files(
        &self,
        accounts: &[Account],
        meeting: &Meeting,
        attendees: &[Attendee],
    ) -> HarvestResult<DocumentArtifact> {
        let query = match Self::build_drive_query(meeting, attendees) {
            Some(q) => q,
            None => {
                return HarvestResult {
                    items: Vec::new(),
                    stats: AccountStats { total_accounts: accounts.len(), successful_accounts: accounts.len(), failed_accounts: vec![] },
                };
            }
        };

        let mut all = Vec::new();
        let mut stats = AccountStats { total_accounts: accounts.len(), ..Default::default() };

        for account in accounts {
            match self.fetch_files_for_account(account, &query).await {
                Ok(mut files) => {
                    stats.successful_accounts += 1;
                    all.append(&mut files);
                }
                Err(e) => {
                    tracing::warn!(account_id = %account.id, error = %e, "drive harvest failed for account");
                    stats.failed_accounts.push(account.id.clone());
                }
            }
        }

        all.retain(|d: &DocumentArtifact| d.modified_time <= meeting.start);
        let deduped = dedup_by_id(all, |d| d.id.as_str());
        HarvestResult { items: deduped, stats }
    }

    async fn fetch_files_for_account(&self, account: &Account, query: &str) -> anyhow::Result<Vec<DocumentArtifact>> {
        let refreshed = self.token_guard.ensure_valid(account).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let clients = create_provider_clients(&refreshed)?;
        Ok(clients.drive.list(query, 200).await?)
    }

    /// `fetch_calendar` — spec §4.3, primary calendar, 180-day window.
    pub async fn fetch_calendar(&self, accounts: &[Account], meeting: &Meeting) -> HarvestResult<CalendarArtifact> {
        let after = meeting.start - Duration::days(CALENDAR_LOOKBACK_DAYS);
        let before = meeting.start;

        let mut all = Vec::new();
        let mut stats = AccountStats { total_accounts: accounts.len(), ..Default::default() };

        for account in accounts {
            match self.fetch_calendar_for_account(account, after, before).await {
                Ok(mut events) => {
                    stats.successful_accounts += 1;
                    all.append(&mut events);
                }
                Err(e) => {
                    tracing::warn!(account_id = %account.id, error = %e, "calendar harvest failed for account");
                    stats.failed_accounts.push(account.id.clone());
                }
            }
        }

        let deduped = dedup_by_id(all, |c| c.id.as_str());
        HarvestResult { items: deduped, stats }
    }

    async fn fetch_calendar_for_account(
        &self,
        account: &Account,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CalendarArtifact>> {
        let refreshed = self.token_guard.ensure_valid(account).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let clients = create_provider_clients(&refreshed)?;
        Ok(clients.calendar.list_events(after, before, 100).await?)
    }

    /// Runs email + file fetch concurrently; merges `account_stats` by
    /// taking the `min()` of each's `successful_accounts` — a deliberate
    /// choice preserved from the source: the combined context is only as
    /// good as its weakest surface.
    pub async fn fetch_all_account_context(
        &self,
        accounts: &[Account],
        meeting: &Meeting,
        attendees: &[Attendee],
    ) -> (HarvestResult<EmailArtifact>, HarvestResult<DocumentArtifact>, AccountStats) {
        let (emails, files) =
            tokio::join!(self.fetch_emails(accounts, meeting, attendees), self.fetch_files(accounts, meeting, attendees));

        let merged = AccountStats {
            total_accounts: accounts.len(),
            successful_accounts: emails.stats.successful_accounts.min(files.stats.successful_accounts),
            failed_accounts: {
                let mut f = emails.stats.failed_accounts.clone();
                for id in &files.stats.failed_accounts {
                    if !f.contains(id) {
                        f.push(id.clone());
                    }
                }
                f
            },
        };

        (emails, files, merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attendee;

    fn meeting(title: &str) -> Meeting {
        Meeting {
            id: "m1".into(),
            title: title.into(),
            description: None,
            start: Utc::now(),
            end: Utc::now() + Duration::hours(1),
            organizer_email: None,
            attendees: vec![],
            timezone: None,
        }
    }

    #[test]
    fn zero_attendee_zero_keyword_query_is_none() {
        let m = meeting("a b");
        assert!(MultiAccountHarvester::build_email_query(&m, &[]).is_none());
    }

    #[test]
    fn zero_attendee_with_keywords_degrades_to_keyword_only() {
        let m = meeting("Roadmap Planning Session");
        let q = MultiAccountHarvester::build_email_query(&m, &[]).unwrap();
        assert!(q.contains("roadmap"));
        assert!(!q.contains("from:"));
    }

    #[test]
    fn attendee_query_includes_address_and_domain_clauses() {
        let m = meeting("Sync");
        let attendees = vec![Attendee { email: "bob@acme.com".into(), display_name: None, response_status: None }];
        let q = MultiAccountHarvester::build_email_query(&m, &attendees).unwrap();
        assert!(q.contains("bob@acme.com"));
        assert!(q.contains("from:*@acme.com"));
    }

    #[test]
    fn drive_query_none_without_attendees() {
        let m = meeting("Sync");
        assert!(MultiAccountHarvester::build_drive_query(&m, &[]).is_none());
    }

    #[test]
    fn account_stats_partial_failure() {
        let stats = AccountStats { total_accounts: 3, successful_accounts: 2, failed_accounts: vec!["a".into()] };
        assert!(stats.partial_failure());
        assert!(!stats.all_failed());
    }
}
