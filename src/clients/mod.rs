//! Client record reconciliation.
//!
//! Keeps a session-local roster of client records consistent with the remote
//! store across two storage shapes (`clients` and the `profiles` fallback).
//!
//! - `mapper`: pure row <-> record transforms; the only code aware of both shapes
//! - `repository`: remote CRUD plus the read-path fallback
//! - `store`: the in-memory active/dropped partitions
//! - `onboarding`: optional identity account, then the record insert
//! - `session`: sequences remote calls and store transitions per record id
//! - `export`: CSV/JSON rendering of a roster snapshot

pub mod export;
pub mod mapper;
pub mod onboarding;
pub mod repository;
pub mod session;
pub mod store;

pub use export::{ExportFormat, render};
pub use onboarding::{ClientOnboarding, OnboardingOptions};
pub use repository::{ClientRepository, RepositoryOptions};
pub use session::ClientSession;
pub use store::{ClientRoster, ClientStore};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// One client of the firm.
///
/// `account_number` and `date_registered` are derived on every mapping from
/// a remote row and are never written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub id: String,
    /// Linked identity-provider account, if one was created.
    pub user_id: Option<String>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub company_name: String,
    pub address: String,
    pub notes: String,
    pub tags: Vec<String>,
    pub assigned_attorney_id: Option<String>,
    pub is_dropped: bool,
    pub dropped_date: Option<DateTime<Utc>>,
    pub dropped_reason: Option<String>,
    pub account_number: String,
    pub date_registered: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input to `ClientRepository::create`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewClient {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub company_name: String,
    pub address: String,
    pub notes: String,
    pub tags: Vec<String>,
    pub assigned_attorney_id: Option<String>,
    pub user_id: Option<String>,
}

impl NewClient {
    pub fn new(full_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    /// Trimmed copy with tags cleaned and blank links dropped.
    pub(crate) fn normalized(self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            company_name: self.company_name.trim().to_string(),
            address: self.address.trim().to_string(),
            notes: self.notes.trim().to_string(),
            tags: normalize_tags(self.tags),
            assigned_attorney_id: non_blank(self.assigned_attorney_id),
            user_id: non_blank(self.user_id),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.full_name.trim().is_empty() {
            return Err(ClientError::required("full_name"));
        }
        if self.email.trim().is_empty() {
            return Err(ClientError::required("email"));
        }
        Ok(())
    }
}

/// Partial update of a client's profile and linkage fields.
///
/// `None` leaves a field alone. Nullable columns take `Some(None)` to clear.
/// Lifecycle fields are absent on purpose: only `drop` writes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub assigned_attorney_id: Option<Option<String>>,
    pub user_id: Option<Option<String>>,
}

impl ClientPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.company_name.is_none()
            && self.address.is_none()
            && self.notes.is_none()
            && self.tags.is_none()
            && self.assigned_attorney_id.is_none()
            && self.user_id.is_none()
    }

    pub(crate) fn normalized(self) -> Self {
        let trim = |value: Option<String>| value.map(|s| s.trim().to_string());
        Self {
            full_name: trim(self.full_name),
            email: trim(self.email),
            phone: trim(self.phone),
            company_name: trim(self.company_name),
            address: trim(self.address),
            notes: trim(self.notes),
            tags: self.tags.map(normalize_tags),
            assigned_attorney_id: self.assigned_attorney_id.map(non_blank),
            user_id: self.user_id.map(non_blank),
        }
    }

    /// Rejects patches that would blank a required field.
    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.full_name.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(ClientError::required("full_name"));
        }
        if self.email.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(ClientError::required("email"));
        }
        Ok(())
    }
}

/// A new client plus the optional password for a login account.
#[derive(Debug, Clone)]
pub struct CreateClientRequest {
    pub client: NewClient,
    pub password: Option<SecretString>,
}

impl CreateClientRequest {
    pub fn without_login(client: NewClient) -> Self {
        Self {
            client,
            password: None,
        }
    }

    pub fn with_password(client: NewClient, password: SecretString) -> Self {
        Self {
            client,
            password: Some(password),
        }
    }
}

/// Records split by lifecycle state, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientPartition {
    pub active: Vec<ClientRecord>,
    pub dropped: Vec<ClientRecord>,
}

impl ClientPartition {
    pub fn len(&self) -> usize {
        self.active.len() + self.dropped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.dropped.is_empty()
    }
}

/// Trim tags, drop blanks and duplicates, keep first-seen order.
pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
