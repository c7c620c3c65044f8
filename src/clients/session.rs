//! UI-facing facade over the client layer.
//!
//! Every mutation issues the remote call first and only applies the store
//! transition once it succeeds, so a failed call leaves the roster as it
//! was. Mutations on the same id are serialized; different ids run freely.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::clients::export::{self, ExportFormat};
use crate::clients::{
    ClientOnboarding, ClientPatch, ClientRecord, ClientRepository, ClientStore,
    CreateClientRequest, OnboardingOptions, RepositoryOptions,
};
use crate::config::ClientsConfig;
use crate::db::RemoteStore;
use crate::error::{ClientError, ExportError};
use crate::identity::IdentityProvider;

/// Per-id async mutexes.
#[derive(Debug, Default)]
pub(crate) struct IdLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdLocks {
    pub(crate) async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct ClientSession {
    repository: Arc<ClientRepository>,
    onboarding: ClientOnboarding,
    store: ClientStore,
    locks: IdLocks,
}

impl ClientSession {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        config: &ClientsConfig,
    ) -> Self {
        let repository = Arc::new(ClientRepository::new(
            remote,
            Arc::clone(&identity),
            RepositoryOptions::from(config),
        ));
        let onboarding = ClientOnboarding::new(
            Arc::clone(&repository),
            identity,
            OnboardingOptions::from(config),
        );
        Self {
            store: ClientStore::new(Arc::clone(&repository)),
            repository,
            onboarding,
            locks: IdLocks::default(),
        }
    }

    pub fn store(&self) -> &ClientStore {
        &self.store
    }

    pub fn repository(&self) -> &ClientRepository {
        &self.repository
    }

    pub async fn reload(&self) -> bool {
        self.store.load().await
    }

    pub async fn create_client(
        &self,
        request: CreateClientRequest,
    ) -> Result<ClientRecord, ClientError> {
        let record = self.onboarding.create_client(request).await?;
        self.store.add(record.clone()).await;
        Ok(record)
    }

    pub async fn update_client(
        &self,
        id: &str,
        patch: ClientPatch,
    ) -> Result<ClientRecord, ClientError> {
        let _guard = self.locks.lock(id).await;
        let record = self.repository.update(id, patch).await?;
        self.store.apply_update(record.clone()).await;
        Ok(record)
    }

    pub async fn drop_client(&self, id: &str, reason: &str) -> Result<ClientRecord, ClientError> {
        let _guard = self.locks.lock(id).await;
        let record = self.repository.drop_client(id, reason).await?;
        self.store.apply_update(record.clone()).await;
        Ok(record)
    }

    pub async fn delete_client(&self, id: &str) -> Result<(), ClientError> {
        let _guard = self.locks.lock(id).await;
        self.repository.delete(id).await?;
        self.store.remove(id).await;
        Ok(())
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> Result<ClientRecord, ClientError> {
        let _guard = self.locks.lock(id).await;
        let record = self.repository.add_tag(id, tag).await?;
        self.store.apply_update(record.clone()).await;
        Ok(record)
    }

    pub async fn remove_tag(&self, id: &str, tag: &str) -> Result<ClientRecord, ClientError> {
        let _guard = self.locks.lock(id).await;
        let record = self.repository.remove_tag(id, tag).await?;
        self.store.apply_update(record.clone()).await;
        Ok(record)
    }

    pub async fn assign_attorney(
        &self,
        id: &str,
        attorney_id: Option<&str>,
    ) -> Result<ClientRecord, ClientError> {
        let _guard = self.locks.lock(id).await;
        let record = self.repository.assign_attorney(id, attorney_id).await?;
        self.store.apply_update(record.clone()).await;
        Ok(record)
    }

    pub async fn set_notes(&self, id: &str, notes: &str) -> Result<ClientRecord, ClientError> {
        let _guard = self.locks.lock(id).await;
        let record = self.repository.set_notes(id, notes).await?;
        self.store.apply_update(record.clone()).await;
        Ok(record)
    }

    /// Render the current roster snapshot.
    pub async fn export(&self, format: ExportFormat) -> Result<String, ExportError> {
        export::render(&self.store.snapshot().await, format)
    }
}
