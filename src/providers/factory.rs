//! Constructs the trait-object clients for one account.
//!
//! Unlike the teacher's LLM-provider factory — which picks exactly one
//! provider by priority — every account needs all three surfaces, so this
//! factory always builds one of each rather than selecting among
//! alternatives.

use super::calendar::{CalendarClient, GoogleCalendarClient};
use super::drive::{DriveClient, GoogleDriveClient};
use super::mail::{GmailClient, MailClient};
use crate::domain::{Account, Provider};
use std::sync::Arc;

pub struct ProviderClients {
    pub mail: Arc<dyn MailClient>,
    pub drive: Arc<dyn DriveClient>,
    pub calendar: Arc<dyn CalendarClient>,
}

/// Build the three clients for a single account's current access token.
/// Only Google is implemented today; Microsoft accounts are rejected with
/// an error rather than silently degrading.
pub fn create_provider_clients(account: &Account) -> anyhow::Result<ProviderClients> {
    let token = account
        .access_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("account {} has no access token", account.id))?;

    match account.provider {
        Provider::Google => Ok(ProviderClients {
            mail: Arc::new(GmailClient::new(token.clone())),
            drive: Arc::new(GoogleDriveClient::new(token.clone())),
            calendar: Arc::new(GoogleCalendarClient::new(token)),
        }),
        Provider::Microsoft => anyhow::bail!("microsoft provider clients not implemented"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(provider: Provider, token: Option<&str>) -> Account {
        Account {
            id: "a1".into(),
            user_id: "u1".into(),
            provider,
            email: "a@example.com".into(),
            access_token: token.map(String::from),
            refresh_token: "rt".into(),
            expires_at: Some(Utc::now()),
            scopes: vec![],
            is_primary: true,
            revoked: false,
        }
    }

    #[test]
    fn missing_token_errors() {
        let acct = account(Provider::Google, None);
        assert!(create_provider_clients(&acct).is_err());
    }

    #[test]
    fn google_account_builds_clients() {
        let acct = account(Provider::Google, Some("tok"));
        assert!(create_provider_clients(&acct).is_ok());
    }

    #[test]
    fn microsoft_not_yet_supported() {
        let acct = account(Provider::Microsoft, Some("tok"));
        assert!(create_provider_clients(&acct).is_err());
    }
}
