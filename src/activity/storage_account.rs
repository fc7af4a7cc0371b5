//! Azure storage account creation
//!
//! Creates a storage account in a resource group, waiting first for a
//! freshly created resource group to settle. Safe to re-deliver: an account
//! that already exists counts as success.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, Instrument};

use super::{Activity, ActivityContext};
use crate::config::PlatformConfig;
use crate::secret::credentials::AzureCredentials;
use crate::secret::SecretStore;
use crate::{Error, Result};

/// Registration name of [`StorageAccountActivity`]
pub const CREATE_STORAGE_ACCOUNT_ACTIVITY: &str = "azure-create-storage-account";

/// Input of [`StorageAccountActivity`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStorageAccountActivityInput {
    /// Organization owning the credential
    pub organization_id: u64,
    /// Azure credential secret id
    pub secret_id: String,
    /// Azure region
    pub location: String,
    /// Resource group holding the account
    pub resource_group: String,
    /// Storage account name
    pub storage_account: String,
}

/// Storage account operations of one Azure subscription
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageAccountClient: Send + Sync {
    /// Whether the account exists in the resource group
    async fn storage_account_exists(&self, resource_group: &str, name: &str) -> Result<bool>;

    /// Create the account
    ///
    /// Returns [`Error::AlreadyExists`] when it exists already.
    async fn create_storage_account(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<()>;
}

/// Builds storage account clients for an organization's credential
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageAccountClientFactory: Send + Sync {
    /// Client for the credential stored under `secret_id`
    async fn new_client(
        &self,
        organization_id: u64,
        secret_id: &str,
    ) -> Result<Arc<dyn StorageAccountClient>>;
}

/// Connects to Azure with service principal credentials
#[cfg_attr(test, automock)]
pub trait AzureClientConnector: Send + Sync {
    /// Storage account client for the credentials' subscription
    fn connect(&self, credentials: &AzureCredentials) -> Result<Arc<dyn StorageAccountClient>>;
}

/// [`StorageAccountClientFactory`] resolving credentials from the secret store
pub struct SecretStorageAccountClientFactory {
    secrets: Arc<dyn SecretStore>,
    connector: Arc<dyn AzureClientConnector>,
}

impl SecretStorageAccountClientFactory {
    /// Create a factory reading credentials from `secrets`
    pub fn new(secrets: Arc<dyn SecretStore>, connector: Arc<dyn AzureClientConnector>) -> Self {
        Self { secrets, connector }
    }
}

#[async_trait]
impl StorageAccountClientFactory for SecretStorageAccountClientFactory {
    async fn new_client(
        &self,
        organization_id: u64,
        secret_id: &str,
    ) -> Result<Arc<dyn StorageAccountClient>> {
        let secret = self.secrets.get(organization_id, secret_id).await?;
        let credentials = AzureCredentials::from_secret_item(&secret)?;
        self.connector.connect(&credentials)
    }
}

/// Creates an Azure storage account
pub struct StorageAccountActivity {
    clients: Arc<dyn StorageAccountClientFactory>,
    settle_delay: Duration,
}

impl StorageAccountActivity {
    /// Create the activity with an explicit settle delay
    pub fn new(clients: Arc<dyn StorageAccountClientFactory>, settle_delay: Duration) -> Self {
        Self {
            clients,
            settle_delay,
        }
    }

    /// Create the activity with the configured settle delay
    pub fn from_config(
        clients: Arc<dyn StorageAccountClientFactory>,
        config: &PlatformConfig,
    ) -> Self {
        Self::new(clients, config.storage_account_settle_delay())
    }

    async fn create(
        &self,
        ctx: &ActivityContext,
        input: &CreateStorageAccountActivityInput,
    ) -> Result<()> {
        info!("creating storage account");

        ctx.sleep(self.settle_delay).await?;

        let client = match ctx
            .run(self.clients.new_client(input.organization_id, &input.secret_id))
            .await
        {
            Ok(client) => client,
            Err(e @ Error::Cancelled { .. }) => return Err(e),
            Err(e) => {
                error!(error = %e, "failed to initialize storage account client");
                return Err(Error::activity_permanent(
                    self.name(),
                    "failed to initialize storage account client",
                ));
            }
        };

        let created = ctx
            .run(async {
                if client
                    .storage_account_exists(&input.resource_group, &input.storage_account)
                    .await?
                {
                    return Ok(false);
                }
                match client
                    .create_storage_account(
                        &input.resource_group,
                        &input.storage_account,
                        &input.location,
                    )
                    .await
                {
                    Ok(()) => Ok(true),
                    Err(e) if e.is_already_exists() => Ok(false),
                    Err(e) => Err(e),
                }
            })
            .await;

        match created {
            Ok(true) => {
                info!("storage account successfully created");
                Ok(())
            }
            Ok(false) => {
                info!("storage account already exists");
                Ok(())
            }
            Err(e @ Error::Cancelled { .. }) => Err(e),
            Err(e) => {
                error!(error = %e, "failed to create storage account");
                Err(Error::activity(self.name(), "failed to create storage account"))
            }
        }
    }
}

#[async_trait]
impl Activity for StorageAccountActivity {
    type Input = CreateStorageAccountActivityInput;

    fn name(&self) -> &'static str {
        CREATE_STORAGE_ACCOUNT_ACTIVITY
    }

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<()> {
        let span = tracing::info_span!(
            "create_storage_account",
            organization_id = input.organization_id,
            secret_id = %input.secret_id,
            location = %input.location,
            resource_group = %input.resource_group,
            storage_account = %input.storage_account,
            attempt = ctx.attempt(),
        );
        self.create(ctx, &input).instrument(span).await
    }
}
