//! Error types for firmdesk.
//!
//! Each layer has its own enum. `ClientError` is what callers of the
//! reconciliation layer see; the others surface from the collaborators it
//! talks to (remote store, identity provider, configuration, export).

use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration file {path:?}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the remote relational store.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Remote store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Table '{0}' is unavailable")]
    Unavailable(String),
}

impl RemoteError {
    /// True for transport-level failures a user-initiated retry may fix.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Unavailable(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Query(_) | Self::Serialization(_) => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Serialization(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Self::Connection(e.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(feature = "libsql")]
impl From<libsql::Error> for RemoteError {
    fn from(e: libsql::Error) -> Self {
        Self::Query(e.to_string())
    }
}

/// Failures from the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity provider is disabled")]
    Disabled,

    #[error("Identity request failed: {0}")]
    Request(String),

    #[error("Identity provider rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Identity provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for IdentityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// A remote row that cannot be turned into a `ClientRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("row from '{table}' has no id")]
    MissingId { table: &'static str },

    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Errors surfaced by the client reconciliation layer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{field} {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Client {id} no longer exists")]
    NotFound { id: String },

    #[error("Repository error: {0}")]
    Repository(#[from] RemoteError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),
}

impl ClientError {
    pub(crate) fn required(field: &'static str) -> Self {
        Self::Validation {
            field,
            message: "is required".to_string(),
        }
    }

    pub(crate) fn not_found(id: &str) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Whether re-issuing the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository(e) => e.is_transient(),
            Self::Validation { .. } | Self::NotFound { .. } | Self::Mapping(_) => false,
        }
    }
}

/// Export rendering failures.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported export format '{0}' (expected csv or json)")]
    UnknownFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable_but_client_errors_are_not() {
        let transient = ClientError::Repository(RemoteError::Status {
            status: 503,
            message: "unavailable".to_string(),
        });
        assert!(transient.is_retryable());

        let forbidden = ClientError::Repository(RemoteError::Status {
            status: 403,
            message: "permission denied".to_string(),
        });
        assert!(!forbidden.is_retryable());

        assert!(!ClientError::not_found("abc").is_retryable());
        assert!(!ClientError::required("email").is_retryable());
    }

    #[test]
    fn validation_message_names_the_field() {
        assert_eq!(
            ClientError::required("full_name").to_string(),
            "full_name is required"
        );
    }
}
