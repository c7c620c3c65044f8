//! Identity-provider abstraction.
//!
//! A client record may be linked (via `user_id`) to an account in the
//! authentication subsystem. The client layer only ever creates and deletes
//! such accounts, and treats both operations as best-effort.

pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;

use crate::config::{IdentityConfig, RemoteConfig};
use crate::error::{ConfigError, IdentityError};

/// Profile metadata attached to a new identity account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountMetadata {
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl AccountMetadata {
    /// Split a display name into given name (first token) and family name
    /// (remaining tokens joined by single spaces).
    pub fn from_full_name(full_name: &str, role: &str) -> Self {
        let mut tokens = full_name.split_whitespace();
        let first_name = tokens.next().unwrap_or_default().to_string();
        let last_name = tokens.collect::<Vec<_>>().join(" ");
        Self {
            first_name,
            last_name,
            role: role.to_string(),
        }
    }
}

/// Account creation request.
#[derive(Debug)]
pub struct NewAccount {
    pub email: String,
    pub password: SecretString,
    pub metadata: AccountMetadata,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account and return its id.
    async fn create_account(&self, account: &NewAccount) -> Result<String, IdentityError>;
    async fn delete_account(&self, account_id: &str) -> Result<(), IdentityError>;
}

/// Provider used when no identity subsystem is configured. Every call fails
/// with `IdentityError::Disabled`, which the client layer logs and ignores.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledIdentityProvider;

#[async_trait]
impl IdentityProvider for DisabledIdentityProvider {
    async fn create_account(&self, _account: &NewAccount) -> Result<String, IdentityError> {
        Err(IdentityError::Disabled)
    }

    async fn delete_account(&self, _account_id: &str) -> Result<(), IdentityError> {
        Err(IdentityError::Disabled)
    }
}

/// Build the configured identity provider.
pub fn provider_from_config(
    identity: &IdentityConfig,
    remote: &RemoteConfig,
) -> Result<Arc<dyn IdentityProvider>, ConfigError> {
    if !identity.enabled {
        return Ok(Arc::new(DisabledIdentityProvider));
    }
    let (url, key) = remote.rest_credentials()?;
    let provider = rest::RestIdentityProvider::new(url, key, remote.request_timeout).map_err(
        |e| ConfigError::InvalidValue {
            key: "FIRMDESK_REMOTE_URL".to_string(),
            message: e.to_string(),
        },
    )?;
    Ok(Arc::new(provider))
}
