//! Credential provider backed by stored accounts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use velo_client::{AccountCredentials, ClientError, CredentialProvider};
use velo_core::AccountLogin;
use velo_store::{Account, Store};

/// Resolves request credentials from the accounts table of the store.
///
/// The accounts are written by the external credential refresher through
/// [`StoreCredentials::upsert`].
pub struct StoreCredentials<S: Store> {
    store: Arc<S>,
}

impl<S: Store> StoreCredentials<S> {
    /// Create a provider reading from `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Store fresh credentials for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert(
        &self,
        login: AccountLogin,
        token: impl Into<String>,
        cookie: impl Into<String>,
    ) -> velo_store::Result<Account> {
        let account = Account {
            login,
            token: token.into(),
            cookie: cookie.into(),
            updated_at: Utc::now(),
        };
        self.store.put_account(&account)?;

        tracing::info!(login = %account.login, "Updated account credentials");
        Ok(account)
    }
}

#[async_trait]
impl<S: Store + 'static> CredentialProvider for StoreCredentials<S> {
    async fn credentials(&self, login: &AccountLogin) -> velo_client::Result<AccountCredentials> {
        let account = self
            .store
            .get_account(login)
            .map_err(|e| ClientError::Credentials {
                login: login.to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| ClientError::Credentials {
                login: login.to_string(),
                reason: "no stored credentials".to_string(),
            })?;

        Ok(AccountCredentials::new(account.token, account.cookie))
    }
}
