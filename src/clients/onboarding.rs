//! Client creation with an optional login account.

use std::sync::Arc;

use secrecy::SecretString;

use crate::clients::{ClientRecord, ClientRepository, CreateClientRequest, NewClient};
use crate::config::ClientsConfig;
use crate::error::ClientError;
use crate::identity::{AccountMetadata, IdentityProvider, NewAccount};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingOptions {
    /// Delete a just-created identity account when the record insert fails.
    pub rollback_orphaned_accounts: bool,
    /// Role recorded in the new account's metadata.
    pub client_role: String,
}

impl Default for OnboardingOptions {
    fn default() -> Self {
        Self {
            rollback_orphaned_accounts: false,
            client_role: "client".to_string(),
        }
    }
}

impl From<&ClientsConfig> for OnboardingOptions {
    fn from(config: &ClientsConfig) -> Self {
        Self {
            rollback_orphaned_accounts: config.rollback_orphaned_accounts,
            client_role: config.client_role.clone(),
        }
    }
}

pub struct ClientOnboarding {
    repository: Arc<ClientRepository>,
    identity: Arc<dyn IdentityProvider>,
    options: OnboardingOptions,
}

impl ClientOnboarding {
    pub fn new(
        repository: Arc<ClientRepository>,
        identity: Arc<dyn IdentityProvider>,
        options: OnboardingOptions,
    ) -> Self {
        Self {
            repository,
            identity,
            options,
        }
    }

    /// Create a client record, first creating a login account when a
    /// password is supplied.
    ///
    /// Account creation never blocks the record: on failure the client is
    /// created unlinked.
    pub async fn create_client(
        &self,
        request: CreateClientRequest,
    ) -> Result<ClientRecord, ClientError> {
        let CreateClientRequest { client, password } = request;
        let mut client = client.normalized();
        client.validate()?;

        let account_id = match password {
            Some(password) => self.provision_account(&client, password).await,
            None => None,
        };
        if let Some(id) = &account_id {
            client.user_id = Some(id.clone());
        }

        let err = match self.repository.create(client).await {
            Ok(record) => return Ok(record),
            Err(e) => e,
        };

        if let Some(account_id) = account_id {
            if self.options.rollback_orphaned_accounts {
                match self.identity.delete_account(&account_id).await {
                    Ok(()) => {
                        tracing::info!(account_id = %account_id, "Rolled back identity account after failed insert");
                    }
                    Err(e) => {
                        tracing::warn!(account_id = %account_id, error = %e, "Failed to roll back identity account");
                    }
                }
            } else {
                tracing::warn!(account_id = %account_id, "Identity account left without a client record");
            }
        }
        Err(err)
    }

    /// Returns the new account id, or `None` when the provider refuses.
    async fn provision_account(&self, client: &NewClient, password: SecretString) -> Option<String> {
        let account = NewAccount {
            email: client.email.clone(),
            password,
            metadata: AccountMetadata::from_full_name(&client.full_name, &self.options.client_role),
        };
        match self.identity.create_account(&account).await {
            Ok(id) => {
                tracing::info!(account_id = %id, "Identity account created");
                Some(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Identity account creation failed; continuing without login");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::clients::RepositoryOptions;
    use crate::clients::repository::tests::FlakyStore;
    use crate::db::memory::MemoryBackend;
    use crate::db::{RemoteStore, Table};
    use crate::error::IdentityError;

    #[derive(Default)]
    struct FakeIdentity {
        fail_create: bool,
        created: Mutex<Vec<AccountMetadata>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        async fn create_account(&self, account: &NewAccount) -> Result<String, IdentityError> {
            if self.fail_create {
                return Err(IdentityError::Request("connection reset".to_string()));
            }
            self.created.lock().await.push(account.metadata.clone());
            Ok("acct-1".to_string())
        }

        async fn delete_account(&self, account_id: &str) -> Result<(), IdentityError> {
            self.deleted.lock().await.push(account_id.to_string());
            Ok(())
        }
    }

    fn onboarding(
        remote: Arc<dyn RemoteStore>,
        identity: Arc<FakeIdentity>,
        options: OnboardingOptions,
    ) -> ClientOnboarding {
        let repository = ClientRepository::new(remote, identity.clone(), RepositoryOptions::default());
        ClientOnboarding::new(Arc::new(repository), identity, options)
    }

    fn password() -> Option<SecretString> {
        Some(SecretString::from("correct horse".to_string()))
    }

    #[tokio::test]
    async fn without_password_identity_step_is_skipped() {
        let identity = Arc::new(FakeIdentity::default());
        let flow = onboarding(Arc::new(MemoryBackend::new()), identity.clone(), OnboardingOptions::default());

        let record = flow
            .create_client(CreateClientRequest::without_login(NewClient::new("Jane Doe", "jane@x.com")))
            .await
            .expect("create");
        assert_eq!(record.user_id, None);
        assert!(!record.is_dropped);
        assert!(identity.created.lock().await.is_empty());
    }

    #[tokio::test]
    async fn password_links_new_account_with_split_name() {
        let identity = Arc::new(FakeIdentity::default());
        let flow = onboarding(Arc::new(MemoryBackend::new()), identity.clone(), OnboardingOptions::default());

        let record = flow
            .create_client(CreateClientRequest {
                client: NewClient::new("Jane van Doe", "jane@x.com"),
                password: password(),
            })
            .await
            .expect("create");
        assert_eq!(record.user_id.as_deref(), Some("acct-1"));

        let created = identity.created.lock().await;
        assert_eq!(created[0].first_name, "Jane");
        assert_eq!(created[0].last_name, "van Doe");
        assert_eq!(created[0].role, "client");
    }

    #[tokio::test]
    async fn identity_failure_is_swallowed() {
        let identity = Arc::new(FakeIdentity {
            fail_create: true,
            ..Default::default()
        });
        let flow = onboarding(Arc::new(MemoryBackend::new()), identity, OnboardingOptions::default());

        let record = flow
            .create_client(CreateClientRequest {
                client: NewClient::new("Jane Doe", "jane@x.com"),
                password: password(),
            })
            .await
            .expect("record still created");
        assert_eq!(record.user_id, None);
    }

    #[tokio::test]
    async fn invalid_input_fails_before_any_account_is_created() {
        let identity = Arc::new(FakeIdentity::default());
        let flow = onboarding(Arc::new(MemoryBackend::new()), identity.clone(), OnboardingOptions::default());

        let err = flow
            .create_client(CreateClientRequest {
                client: NewClient::new("Jane Doe", " "),
                password: password(),
            })
            .await
            .expect_err("blank email");
        assert!(matches!(err, ClientError::Validation { field: "email", .. }));
        assert!(identity.created.lock().await.is_empty());
    }

    fn offline_clients() -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: MemoryBackend::new(),
            failing: vec![Table::Clients],
        })
    }

    #[tokio::test]
    async fn insert_failure_leaves_account_by_default() {
        let identity = Arc::new(FakeIdentity::default());
        let flow = onboarding(offline_clients(), identity.clone(), OnboardingOptions::default());

        let err = flow
            .create_client(CreateClientRequest {
                client: NewClient::new("Jane Doe", "jane@x.com"),
                password: password(),
            })
            .await
            .expect_err("insert fails");
        assert!(matches!(err, ClientError::Repository(_)));
        assert!(identity.deleted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn insert_failure_rolls_back_account_when_enabled() {
        let identity = Arc::new(FakeIdentity::default());
        let flow = onboarding(
            offline_clients(),
            identity.clone(),
            OnboardingOptions {
                rollback_orphaned_accounts: true,
                ..Default::default()
            },
        );

        flow.create_client(CreateClientRequest {
            client: NewClient::new("Jane Doe", "jane@x.com"),
            password: password(),
        })
        .await
        .expect_err("insert fails");
        assert_eq!(*identity.deleted.lock().await, vec!["acct-1".to_string()]);
    }
}
