//! Account credential resolution.
//!
//! Every request to the bike-share service is made on behalf of a service
//! account and must carry that account's bearer token and anti-bot cookie.
//! Acquiring them is someone else's job; the client only asks a
//! [`CredentialProvider`] for the current values right before each request.

use std::collections::HashMap;

use async_trait::async_trait;
use velo_core::AccountLogin;

use crate::error::{ClientError, Result};

/// The secrets attached to requests made with an account.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountCredentials {
    /// Bearer token.
    pub token: String,
    /// `qrator_jsid` cookie value.
    pub cookie: String,
}

impl AccountCredentials {
    /// Create credentials from a token and a cookie.
    #[must_use]
    pub fn new(token: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            cookie: cookie.into(),
        }
    }

    /// The `Cookie` header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        format!("qrator_jsid={}", self.cookie)
    }
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("token", &"<redacted>")
            .field("cookie", &"<redacted>")
            .finish()
    }
}

/// Source of account credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve the current credentials of an account.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Credentials` if the account is unknown or its
    /// credentials cannot be read.
    async fn credentials(&self, login: &AccountLogin) -> Result<AccountCredentials>;
}

/// A fixed in-memory credential table.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    accounts: HashMap<AccountLogin, AccountCredentials>,
}

impl StaticCredentials {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account.
    #[must_use]
    pub fn with_account(mut self, login: AccountLogin, credentials: AccountCredentials) -> Self {
        self.accounts.insert(login, credentials);
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self, login: &AccountLogin) -> Result<AccountCredentials> {
        self.accounts
            .get(login)
            .cloned()
            .ok_or_else(|| ClientError::Credentials {
                login: login.to_string(),
                reason: "unknown account".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let creds = AccountCredentials::new("secret-token", "secret-cookie");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn static_credentials_lookup() {
        let login = AccountLogin::new("u1").unwrap();
        let provider = StaticCredentials::new()
            .with_account(login.clone(), AccountCredentials::new("t", "c"));

        let creds = provider.credentials(&login).await.unwrap();
        assert_eq!(creds.cookie_header(), "qrator_jsid=c");

        let missing = AccountLogin::new("u2").unwrap();
        assert!(provider.credentials(&missing).await.is_err());
    }
}
