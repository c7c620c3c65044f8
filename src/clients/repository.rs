//! Remote CRUD for client records.

use std::sync::Arc;

use chrono::Utc;

use crate::clients::mapper::{self, SourceRow};
use crate::clients::{ClientPartition, ClientPatch, ClientRecord, NewClient};
use crate::config::ClientsConfig;
use crate::db::{Filter, Order, Query, RemoteStore, Row, Table};
use crate::error::{ClientError, RemoteError};
use crate::identity::IdentityProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryOptions {
    /// Read client-role `profiles` rows when `clients` is empty or failing.
    pub profiles_fallback: bool,
    pub client_role: String,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            profiles_fallback: true,
            client_role: "client".to_string(),
        }
    }
}

impl From<&ClientsConfig> for RepositoryOptions {
    fn from(config: &ClientsConfig) -> Self {
        Self {
            profiles_fallback: config.profiles_fallback,
            client_role: config.client_role.clone(),
        }
    }
}

fn newest_first() -> Query {
    Query::new().order(Order::desc("created_at"))
}

/// Map rows into partitions, skipping (and logging) rows that don't map.
fn partition(rows: Vec<Row>, tag: fn(Row) -> SourceRow) -> ClientPartition {
    let mut out = ClientPartition::default();
    for row in rows {
        let source = tag(row);
        match mapper::to_internal(&source) {
            Ok(record) if record.is_dropped => out.dropped.push(record),
            Ok(record) => out.active.push(record),
            Err(e) => {
                tracing::warn!(table = %source.table(), error = %e, "Skipping unmappable client row");
            }
        }
    }
    out
}

pub struct ClientRepository {
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    options: RepositoryOptions,
}

impl ClientRepository {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        options: RepositoryOptions,
    ) -> Self {
        Self {
            remote,
            identity,
            options,
        }
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// All client records, split into active and dropped, newest first.
    ///
    /// Falls back to client-role `profiles` rows when `clients` yields nothing
    /// or fails. Profile-sourced records are always active.
    pub async fn get_all(&self) -> Result<ClientPartition, ClientError> {
        let primary_error = match self.remote.select(Table::Clients, &newest_first()).await {
            Ok(rows) if !rows.is_empty() => {
                return Ok(partition(rows, SourceRow::Clients));
            }
            Ok(_) => None,
            Err(e) => Some(e),
        };

        if !self.options.profiles_fallback {
            return match primary_error {
                Some(e) => Err(e.into()),
                None => Ok(ClientPartition::default()),
            };
        }

        match &primary_error {
            Some(e) => tracing::warn!(error = %e, "Clients table unavailable, reading profiles"),
            None => tracing::warn!("Clients table empty, reading profiles"),
        }

        let query = newest_first().filter(Filter::eq("role", self.options.client_role.as_str()));
        match self.remote.select(Table::Profiles, &query).await {
            Ok(rows) => Ok(partition(rows, SourceRow::Profiles)),
            Err(e) if primary_error.is_none() => {
                tracing::warn!(error = %e, "Profiles fallback failed; no clients to show");
                Ok(ClientPartition::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_row(&self, id: &str) -> Result<Option<Row>, RemoteError> {
        let rows = self.remote.select(Table::Clients, &Query::by_id(id)).await?;
        Ok(rows.into_iter().next())
    }

    /// Single record from the `clients` table; `None` when no row matches.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<ClientRecord>, ClientError> {
        match self.fetch_row(id).await? {
            Some(row) => Ok(Some(mapper::to_internal(&SourceRow::Clients(row))?)),
            None => Ok(None),
        }
    }

    async fn require(&self, id: &str) -> Result<ClientRecord, ClientError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ClientError::not_found(id))
    }

    pub async fn create(&self, client: NewClient) -> Result<ClientRecord, ClientError> {
        let client = client.normalized();
        client.validate()?;

        let row = self
            .remote
            .insert(Table::Clients, &mapper::new_client_to_external(&client))
            .await?;
        let record = mapper::to_internal(&SourceRow::Clients(row))?;
        tracing::info!(client_id = %record.id, linked = record.user_id.is_some(), "Client created");
        Ok(record)
    }

    /// Apply the fields present in `patch`.
    pub async fn update(&self, id: &str, patch: ClientPatch) -> Result<ClientRecord, ClientError> {
        let patch = patch.normalized();
        patch.validate()?;
        if patch.is_empty() {
            return self.require(id).await;
        }

        let row = self
            .remote
            .update(Table::Clients, id, &mapper::to_external(&patch))
            .await?
            .ok_or_else(|| ClientError::not_found(id))?;
        let record = mapper::to_internal(&SourceRow::Clients(row))?;
        tracing::info!(client_id = %id, "Client updated");
        Ok(record)
    }

    /// Mark a client dropped. Date and reason are written in the same update.
    ///
    /// The reason is stored exactly as given; a blank reason is rejected.
    /// Dropping an already-dropped client overwrites date and reason.
    pub async fn drop_client(&self, id: &str, reason: &str) -> Result<ClientRecord, ClientError> {
        if reason.trim().is_empty() {
            return Err(ClientError::required("reason"));
        }
        let patch = mapper::drop_to_external(reason, Utc::now());
        let row = self
            .remote
            .update(Table::Clients, id, &patch)
            .await?
            .ok_or_else(|| ClientError::not_found(id))?;
        let record = mapper::to_internal(&SourceRow::Clients(row))?;
        tracing::info!(client_id = %id, "Client dropped");
        Ok(record)
    }

    /// Delete a client row, removing its linked identity account first.
    ///
    /// The account deletion is best-effort: a failure is logged and the row
    /// is deleted anyway.
    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        let row = self
            .fetch_row(id)
            .await?
            .ok_or_else(|| ClientError::not_found(id))?;

        if let Some(account_id) = mapper::linked_account_id(&row)
            && let Err(e) = self.identity.delete_account(&account_id).await
        {
            tracing::warn!(
                client_id = %id,
                account_id = %account_id,
                error = %e,
                "Failed to delete linked identity account"
            );
        }

        if !self.remote.delete(Table::Clients, id).await? {
            return Err(ClientError::not_found(id));
        }
        tracing::info!(client_id = %id, "Client deleted");
        Ok(())
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> Result<ClientRecord, ClientError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ClientError::required("tag"));
        }
        let current = self.require(id).await?;
        if current.tags.iter().any(|t| t == tag) {
            return Ok(current);
        }
        let mut tags = current.tags;
        tags.push(tag.to_string());
        self.update(
            id,
            ClientPatch {
                tags: Some(tags),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn remove_tag(&self, id: &str, tag: &str) -> Result<ClientRecord, ClientError> {
        let tag = tag.trim();
        let current = self.require(id).await?;
        if !current.tags.iter().any(|t| t == tag) {
            return Ok(current);
        }
        let tags = current.tags.into_iter().filter(|t| t != tag).collect();
        self.update(
            id,
            ClientPatch {
                tags: Some(tags),
                ..Default::default()
            },
        )
        .await
    }

    /// Assign (or with `None`, unassign) the responsible attorney.
    pub async fn assign_attorney(
        &self,
        id: &str,
        attorney_id: Option<&str>,
    ) -> Result<ClientRecord, ClientError> {
        self.update(
            id,
            ClientPatch {
                assigned_attorney_id: Some(attorney_id.map(str::to_string)),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_notes(&self, id: &str, notes: &str) -> Result<ClientRecord, ClientError> {
        self.update(
            id,
            ClientPatch {
                notes: Some(notes.to_string()),
                ..Default::default()
            },
        )
        .await
    }
}
