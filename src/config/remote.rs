use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::config::helpers::{optional_env, parse_string_env, parse_u64_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Which remote store backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Rest,
    LibSql,
    Memory,
}

impl BackendKind {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rest" | "postgrest" | "supabase" => Ok(Self::Rest),
            "libsql" | "sqlite" => Ok(Self::LibSql),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue {
                key: "FIRMDESK_BACKEND".to_string(),
                message: format!("unsupported backend '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::LibSql => "libsql",
            Self::Memory => "memory",
        }
    }
}

/// Remote store connection settings.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub backend: BackendKind,
    pub url: Option<Url>,
    pub service_key: Option<SecretString>,
    pub libsql_path: PathBuf,
    pub request_timeout: Duration,
}

pub fn default_libsql_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("firmdesk")
        .join("firmdesk.db")
}

pub(crate) fn validate_remote_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: "FIRMDESK_REMOTE_URL".to_string(),
        message: format!("not a valid URL: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: "FIRMDESK_REMOTE_URL".to_string(),
            message: format!("scheme must be http or https, got '{}'", url.scheme()),
        });
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigError::InvalidValue {
            key: "FIRMDESK_REMOTE_URL".to_string(),
            message: "URL must not carry a query string or fragment".to_string(),
        });
    }
    Ok(url)
}

impl RemoteConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let backend_raw = parse_string_env("FIRMDESK_BACKEND", settings.remote.backend.clone())?;
        let backend = BackendKind::from_str(&backend_raw)?;

        let url = match optional_env("FIRMDESK_REMOTE_URL")?.or_else(|| settings.remote.url.clone())
        {
            Some(raw) => Some(validate_remote_url(&raw)?),
            None => None,
        };

        let service_key = optional_env("FIRMDESK_SERVICE_KEY")?
            .or_else(|| settings.remote.service_key.clone())
            .map(SecretString::from);

        let libsql_path = optional_env("FIRMDESK_LIBSQL_PATH")?
            .map(PathBuf::from)
            .or_else(|| settings.remote.libsql_path.clone())
            .unwrap_or_else(default_libsql_path);

        let timeout_secs = parse_u64_env(
            "FIRMDESK_REQUEST_TIMEOUT_SECS",
            settings.remote.request_timeout_secs,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FIRMDESK_REQUEST_TIMEOUT_SECS".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        let config = Self {
            backend,
            url,
            service_key,
            libsql_path,
            request_timeout: Duration::from_secs(timeout_secs),
        };
        if config.backend == BackendKind::Rest {
            config.rest_credentials()?;
        }
        Ok(config)
    }

    /// URL and service key, both required by the HTTP backend and the
    /// identity provider.
    pub fn rest_credentials(&self) -> Result<(&Url, &SecretString), ConfigError> {
        let url = self.url.as_ref().ok_or_else(|| ConfigError::MissingRequired {
            key: "FIRMDESK_REMOTE_URL".to_string(),
            hint: "Set it to the hosted database base URL".to_string(),
        })?;
        let key = self
            .service_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "FIRMDESK_SERVICE_KEY".to_string(),
                hint: "Set it to the service-role API key".to_string(),
            })?;
        Ok((url, key))
    }
}
