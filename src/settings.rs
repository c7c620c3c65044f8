//! File-backed settings.
//!
//! `firmdesk.toml` is optional; every field has a default so an empty or
//! missing file yields a usable configuration. Environment variables layered
//! on top in `Config::resolve` always win.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SETTINGS_FILE: &str = "firmdesk.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub remote: RemoteSettings,
    pub identity: IdentitySettings,
    pub clients: ClientSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// `rest`, `libsql` or `memory`.
    pub backend: String,
    pub url: Option<String>,
    /// Prefer `FIRMDESK_SERVICE_KEY`; keys in files end up in backups.
    pub service_key: Option<String>,
    pub libsql_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            backend: "libsql".to_string(),
            url: None,
            service_key: None,
            libsql_path: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// `None` means "enabled whenever a remote URL is configured".
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub profiles_fallback: bool,
    pub client_role: String,
    pub rollback_orphaned_accounts: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            profiles_fallback: true,
            client_role: "client".to_string(),
            rollback_orphaned_accounts: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "firmdesk=info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::ParseError {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load settings from `path`. A missing file yields defaults unless the
    /// path was given explicitly.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_SETTINGS_FILE), false),
        };

        match std::fs::read_to_string(&path) {
            Ok(raw) => Self::from_toml(&raw, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }
}
