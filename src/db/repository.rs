//! Repository trait seam over the SQLite pool (spec §3.1).
//!
//! Pipeline components take `Arc<dyn UserRepository>` etc. so tests can
//! substitute an in-memory pool without touching call sites — the same
//! reasoning behind the teacher's `db::repository` split of concerns.

use crate::domain::{Account, Provider, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::Db;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>>;
    async fn list_users(&self) -> anyhow::Result<Vec<User>>;
    async fn upsert_user(&self, user: &User) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn list_accounts_for_user(&self, user_id: &str) -> anyhow::Result<Vec<Account>>;
    async fn upsert_account(&self, account: &Account) -> anyhow::Result<()>;
    async fn mark_revoked(&self, account_id: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait BriefRepository: Send + Sync {
    async fn get_brief(&self, user_id: &str, meeting_id: &str) -> anyhow::Result<Option<serde_json::Value>>;
    /// `INSERT ... ON CONFLICT(user_id, meeting_id) DO UPDATE` — last-writer-wins.
    async fn upsert_brief(
        &self,
        user_id: &str,
        meeting_id: &str,
        brief_json: &serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
    async fn briefs_for_user_on_date(
        &self,
        user_id: &str,
        meeting_ids: &[String],
    ) -> anyhow::Result<Vec<serde_json::Value>>;
}

/// Marker trait combining all three concerns, so call sites that need the
/// whole store can take one object instead of three.
pub trait Repository: UserRepository + AccountRepository + BriefRepository {}
impl<T: UserRepository + AccountRepository + BriefRepository> Repository for T {}

#[derive(Clone)]
pub struct SqliteRepository {
    pool: Db,
}

impl SqliteRepository {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteRepository {
    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, emails_json, name, timezone FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_user))
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query("SELECT id, email, emails_json, name, timezone FROM users")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_user).collect())
    }

    async fn upsert_user(&self, user: &User) -> anyhow::Result<()> {
        let emails_json = serde_json::to_string(&user.emails)?;
        sqlx::query(
            r#"
            INSERT INTO users (id, email, emails_json, name, timezone)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                emails_json = excluded.emails_json,
                name = excluded.name,
                timezone = excluded.timezone
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(emails_json)
        .bind(&user.name)
        .bind(&user.timezone)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_user(row: sqlx::sqlite::SqliteRow) -> User {
    let emails_json: String = row.get("emails_json");
    User {
        id: row.get("id"),
        email: row.get("email"),
        emails: serde_json::from_str(&emails_json).unwrap_or_default(),
        name: row.get("name"),
        timezone: row.get("timezone"),
    }
}

#[async_trait]
impl AccountRepository for SqliteRepository {
    async fn list_accounts_for_user(&self, user_id: &str) -> anyhow::Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"SELECT id, user_id, provider, email, access_token, refresh_token,
                      expires_at, scopes_json, is_primary, revoked
               FROM accounts WHERE user_id = ?1"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_account).collect()
    }

    async fn upsert_account(&self, account: &Account) -> anyhow::Result<()> {
        let provider = match account.provider {
            Provider::Google => "google",
            Provider::Microsoft => "microsoft",
        };
        let scopes_json = serde_json::to_string(&account.scopes)?;
        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, user_id, provider, email, access_token, refresh_token, expires_at, scopes_json, is_primary, revoked)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                scopes_json = excluded.scopes_json,
                is_primary = excluded.is_primary,
                revoked = excluded.revoked
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(provider)
        .bind(&account.email)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.expires_at.map(|t| t.to_rfc3339()))
        .bind(scopes_json)
        .bind(account.is_primary)
        .bind(account.revoked)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_revoked(&self, account_id: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE accounts SET revoked = 1 WHERE id = ?1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_account(row: sqlx::sqlite::SqliteRow) -> anyhow::Result<Account> {
    let provider_str: String = row.get("provider");
    let provider = match provider_str.as_str() {
        "google" => Provider::Google,
        "microsoft" => Provider::Microsoft,
        other => anyhow::bail!("unknown provider in db row: {other}"),
    };
    let scopes_json: String = row.get("scopes_json");
    let expires_at: Option<String> = row.get("expires_at");
    Ok(Account {
        id: row.get("id"),
        user_id: row.get("user_id"),
        provider,
        email: row.get("email"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: expires_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)),
        scopes: serde_json::from_str(&scopes_json).unwrap_or_default(),
        is_primary: row.get("is_primary"),
        revoked: row.get("revoked"),
    })
}

#[async_trait]
impl BriefRepository for SqliteRepository {
    async fn get_brief(&self, user_id: &str, meeting_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT brief_json FROM briefs WHERE user_id = ?1 AND meeting_id = ?2")
            .bind(user_id)
            .bind(meeting_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => {
                let json: String = r.get("brief_json");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_brief(
        &self,
        user_id: &str,
        meeting_id: &str,
        brief_json: &serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string(brief_json)?;
        sqlx::query(
            r#"
            INSERT INTO briefs (user_id, meeting_id, brief_json, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, meeting_id) DO UPDATE SET
                brief_json = excluded.brief_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(meeting_id)
        .bind(json)
        .bind(updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn briefs_for_user_on_date(
        &self,
        user_id: &str,
        meeting_ids: &[String],
    ) -> anyhow::Result<Vec<serde_json::Value>> {
        let mut out = Vec::with_capacity(meeting_ids.len());
        for id in meeting_ids {
            if let Some(b) = self.get_brief(user_id, id).await? {
                out.push(b);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_repo() -> SqliteRepository {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteRepository::new(pool)
    }

    #[tokio::test]
    async fn user_upsert_and_get_round_trips() {
        let repo = test_repo().await;
        let user = User {
            id: "u1".into(),
            email: "a@example.com".into(),
            emails: vec!["a@example.com".into(), "alias@example.com".into()],
            name: "Ada".into(),
            timezone: "America/New_York".into(),
        };
        repo.upsert_user(&user).await.unwrap();
        let fetched = repo.get_user("u1").await.unwrap().unwrap();
        assert_eq!(fetched.emails.len(), 2);
        assert_eq!(fetched.timezone, "America/New_York");
    }

    #[tokio::test]
    async fn brief_upsert_is_last_writer_wins() {
        let repo = test_repo().await;
        let v1 = serde_json::json!({"summary": "first"});
        let v2 = serde_json::json!({"summary": "second"});
        repo.upsert_brief("u1", "m1", &v1, Utc::now()).await.unwrap();
        repo.upsert_brief("u1", "m1", &v2, Utc::now()).await.unwrap();
        let got = repo.get_brief("u1", "m1").await.unwrap().unwrap();
        assert_eq!(got["summary"], "second");
    }

    #[tokio::test]
    async fn account_mark_revoked() {
        let repo = test_repo().await;
        repo.upsert_user(&User {
            id: "u1".into(),
            email: "a@example.com".into(),
            emails: vec!["a@example.com".into()],
            name: "Ada".into(),
            timezone: "UTC".into(),
        })
        .await
        .unwrap();
        let account = Account {
            id: "acc1".into(),
            user_id: "u1".into(),
            provider: Provider::Google,
            email: "a@example.com".into(),
            access_token: Some("tok".into()),
            refresh_token: "rt".into(),
            expires_at: Some(Utc::now()),
            scopes: vec!["mail".into()],
            is_primary: true,
            revoked: false,
        };
        repo.upsert_account(&account).await.unwrap();
        repo.mark_revoked("acc1").await.unwrap();
        let accounts = repo.list_accounts_for_user("u1").await.unwrap();
        assert!(accounts[0].revoked);
    }
}
