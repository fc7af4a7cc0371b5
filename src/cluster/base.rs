//! Common base shared by every cluster variant
//!
//! Owns the cluster row and three lazily resolved slots: the primary
//! secret, the SSH secret and the decoded kubeconfig. Each slot is a
//! [`OnceCell`], so concurrent first resolution on one entity performs a
//! single fetch and failed resolutions are not cached.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::model::{CloudType, ClusterModel};
use crate::secret::{SecretItem, SecretStore, SecretType, K8S_CONFIG_KEY};
use crate::{Error, Result};

/// Cluster row plus its secret and kubeconfig caches
#[derive(Debug)]
pub struct ClusterBase {
    model: ClusterModel,
    secret: OnceCell<SecretItem>,
    ssh_secret: OnceCell<SecretItem>,
    config: OnceCell<Vec<u8>>,
}

impl ClusterBase {
    /// Wrap a cluster row with empty caches
    pub fn new(model: ClusterModel) -> Self {
        Self {
            model,
            secret: OnceCell::new(),
            ssh_secret: OnceCell::new(),
            config: OnceCell::new(),
        }
    }

    /// The cluster row
    pub fn model(&self) -> &ClusterModel {
        &self.model
    }

    pub(crate) fn model_mut(&mut self) -> &mut ClusterModel {
        &mut self.model
    }

    /// Primary secret, validated against the cluster's provider tag
    ///
    /// The raw secret is fetched at most once; the type check runs on every
    /// call.
    pub async fn secret(&self, store: &dyn SecretStore) -> Result<&SecretItem> {
        let cloud: CloudType = self.model.cloud.parse()?;

        let secret = self
            .secret
            .get_or_try_init(|| async {
                debug!(
                    cluster = %self.model.name,
                    secret_id = %self.model.secret_id,
                    "resolving primary secret"
                );
                store
                    .get(self.model.organization_id, &self.model.secret_id)
                    .await
            })
            .await
            .map_err(|e| Error::in_cluster(&self.model.name, e))?;

        secret
            .validate_type(cloud.secret_type())
            .map_err(|e| Error::in_cluster(&self.model.name, e))?;
        Ok(secret)
    }

    /// SSH secret, validated as [`SecretType::Ssh`]
    pub async fn ssh_secret(&self, store: &dyn SecretStore) -> Result<&SecretItem> {
        self.ssh_secret
            .get_or_try_init(|| async {
                if self.model.ssh_secret_id.is_empty() {
                    return Err(Error::validation_for_field(
                        &self.model.name,
                        "sshSecretId",
                        "cluster has no ssh secret",
                    ));
                }
                debug!(
                    cluster = %self.model.name,
                    secret_id = %self.model.ssh_secret_id,
                    "resolving ssh secret"
                );
                let secret = store
                    .get(self.model.organization_id, &self.model.ssh_secret_id)
                    .await?;
                secret.validate_type(SecretType::Ssh)?;
                Ok(secret)
            })
            .await
            .map_err(|e| Error::in_cluster(&self.model.name, e))
    }

    /// Decoded kubeconfig
    ///
    /// Fails with [`Error::ConfigNotAvailable`] while the cluster has no
    /// config secret (it hasn't finished provisioning).
    pub async fn config(&self, store: &dyn SecretStore) -> Result<&[u8]> {
        let config = self
            .config
            .get_or_try_init(|| async {
                if self.model.config_secret_id.is_empty() {
                    return Err(Error::ConfigNotAvailable {
                        cluster: self.model.name.clone(),
                    });
                }
                let secret = store
                    .get(self.model.organization_id, &self.model.config_secret_id)
                    .await?;
                secret.validate_type(SecretType::Kubeconfig)?;
                decode_config(secret.required_value(K8S_CONFIG_KEY)?)
            })
            .await
            .map_err(|e| Error::in_cluster(&self.model.name, e))?;
        Ok(config.as_slice())
    }

    /// Replace the cached kubeconfig with freshly stored bytes
    pub(crate) fn set_config(&mut self, config: Vec<u8>) {
        self.config = OnceCell::new_with(Some(config));
    }

    /// Drop the cached ssh secret
    pub(crate) fn reset_ssh_secret(&mut self) {
        self.ssh_secret.take();
    }

    /// Drop the cached kubeconfig
    pub(crate) fn reset_config(&mut self) {
        self.config.take();
    }

    /// Drop all cached values; the next access re-fetches
    pub fn invalidate_caches(&mut self) {
        self.secret.take();
        self.ssh_secret.take();
        self.config.take();
    }

    /// True once the primary secret has been fetched
    pub fn is_secret_cached(&self) -> bool {
        self.secret.initialized()
    }

    /// True once the kubeconfig has been resolved
    pub fn is_config_cached(&self) -> bool {
        self.config.initialized()
    }
}

/// Decode a base64 kubeconfig value
pub(crate) fn decode_config(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::serialization_for_kind("kubeconfig", e.to_string()))
}
