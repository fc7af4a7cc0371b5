//! Storing a cluster's kubeconfig in the secret store

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;
use tracing::{error, info};

use super::Cluster;
use crate::secret::{
    cluster_uid_tag, generate_secret_id, CreateSecretRequest, SecretStore, SecretType,
    K8S_CONFIG_KEY, TAG_KUBECONFIG, TAG_READONLY,
};
use crate::{Error, Result};

/// Name of the kubeconfig secret of a cluster
pub fn config_secret_name(cluster_id: u64) -> String {
    format!("cluster-{cluster_id}-config")
}

impl Cluster {
    /// Store a kubeconfig as the cluster's config secret and record its id
    ///
    /// The secret is created on first call and overwritten afterwards, based
    /// on the version currently stored. Returns the secret id.
    ///
    /// The secret write and the row update are not atomic: if recording the
    /// id fails, the secret stays stored under its deterministic id and the
    /// next call overwrites it.
    pub async fn store_kubernetes_config(&mut self, config: &[u8]) -> Result<String> {
        if !self.model().is_persisted() {
            return Err(Error::validation_for(
                self.name(),
                "cluster must be persisted before its kubeconfig is stored",
            ));
        }

        let mut request = CreateSecretRequest {
            name: config_secret_name(self.id()),
            secret_type: SecretType::Kubeconfig,
            values: HashMap::from([(K8S_CONFIG_KEY.to_string(), STANDARD.encode(config))]),
            tags: vec![
                TAG_KUBECONFIG.to_string(),
                TAG_READONLY.to_string(),
                cluster_uid_tag(self.uid()),
            ],
            version: None,
        };
        let secret_id = generate_secret_id(&request);
        let organization_id = self.organization_id();

        request.version = match self.clients.secrets.get(organization_id, &secret_id).await {
            Ok(existing) => Some(existing.version),
            Err(e) if e.is_secret_not_found() => None,
            Err(e) => return Err(Error::in_cluster(self.name(), e)),
        };

        self.clients
            .secrets
            .update(organization_id, &secret_id, &request)
            .await
            .map_err(|e| Error::in_cluster(self.name(), e))?;

        if let Err(e) = self.save_config_secret_id(&secret_id).await {
            error!(
                cluster = %self.name(),
                secret_id = %secret_id,
                error = %e,
                "kubeconfig secret stored but the cluster row was not updated"
            );
            return Err(Error::in_cluster(self.name(), e));
        }
        self.base.set_config(config.to_vec());

        info!(cluster = %self.name(), secret_id = %secret_id, "kubeconfig stored");
        Ok(secret_id)
    }
}
