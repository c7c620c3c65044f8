//! Runtime configuration.
//!
//! `Settings` (the optional TOML file) supplies defaults; environment
//! variables override them. `.env` is loaded by the binary before
//! `Config::resolve` runs.

pub(crate) mod helpers;
mod remote;

pub use remote::{BackendKind, RemoteConfig, default_libsql_path};

use crate::config::helpers::{optional_env, parse_bool_env, parse_string_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Identity-provider controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityConfig {
    pub enabled: bool,
}

/// Client reconciliation behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientsConfig {
    /// Read `profiles` when `clients` is empty or unavailable.
    pub profiles_fallback: bool,
    /// `profiles.role` value that marks a client.
    pub client_role: String,
    /// Delete a freshly created identity account when the record insert fails.
    pub rollback_orphaned_accounts: bool,
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub identity: IdentityConfig,
    pub clients: ClientsConfig,
    pub logging: LoggingConfig,
}

fn validate_client_role(raw: &str) -> Result<String, ConfigError> {
    let role = raw.trim();
    if role.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "FIRMDESK_CLIENT_ROLE".to_string(),
            message: "client role must not be empty".to_string(),
        });
    }
    if !role
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::InvalidValue {
            key: "FIRMDESK_CLIENT_ROLE".to_string(),
            message: format!("client role '{role}' may only contain [A-Za-z0-9_-]"),
        });
    }
    Ok(role.to_string())
}

impl Config {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let remote = RemoteConfig::resolve(settings)?;

        let identity_default = settings.identity.enabled.unwrap_or(remote.url.is_some());
        let identity = IdentityConfig {
            enabled: parse_bool_env("FIRMDESK_IDENTITY_ENABLED", identity_default)?,
        };
        if identity.enabled {
            remote.rest_credentials()?;
        }

        let clients = ClientsConfig {
            profiles_fallback: parse_bool_env(
                "FIRMDESK_PROFILES_FALLBACK",
                settings.clients.profiles_fallback,
            )?,
            client_role: {
                let raw =
                    parse_string_env("FIRMDESK_CLIENT_ROLE", settings.clients.client_role.clone())?;
                validate_client_role(&raw)?
            },
            rollback_orphaned_accounts: parse_bool_env(
                "FIRMDESK_ROLLBACK_ORPHANED_ACCOUNTS",
                settings.clients.rollback_orphaned_accounts,
            )?,
        };

        let logging = LoggingConfig {
            filter: optional_env("FIRMDESK_LOG")?.unwrap_or_else(|| settings.logging.filter.clone()),
            json: parse_bool_env("FIRMDESK_LOG_JSON", settings.logging.json)?,
        };

        Ok(Self {
            remote,
            identity,
            clients,
            logging,
        })
    }
}
