//! Managed Kubernetes provider boundary
//!
//! The cloud SDK calls themselves live outside this crate. Variants talk to
//! a provider through [`ManagedKubernetes`], built per call from the
//! cluster's primary secret by a [`ProviderClientFactory`].
//!
//! Provider implementations must report an existing resource on create as
//! [`crate::Error::AlreadyExists`] and a missing one on delete as
//! [`crate::Error::RecordNotFound`], so that lifecycle steps can be repeated.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::model::{ClusterKind, NodePool};
use crate::secret::SecretItem;
use crate::Result;

/// Everything a provider needs to create or update a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionSpec {
    /// Cluster name
    pub name: String,
    /// Target location
    pub location: String,
    /// Kubernetes version
    pub kubernetes_version: String,
    /// Node pools
    pub node_pools: Vec<NodePool>,
    /// Provider-specific parameters (resource group, project, VPC, ...)
    pub parameters: serde_json::Value,
    /// SSH public key for node access, when the variant requires one
    pub ssh_public_key: Option<String>,
}

/// Remote state of a cluster as reported by its provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "message")]
pub enum RemoteClusterState {
    /// Still being created or updated
    Provisioning,
    /// Serving
    Running,
    /// Provider reports a failure
    Failed(String),
    /// Provider has no such cluster
    NotFound,
}

/// Client for one provider account
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManagedKubernetes: Send + Sync {
    /// Provision a cluster; returns once its control plane is reachable
    async fn create_cluster(&self, spec: &ProvisionSpec) -> Result<()>;

    /// Apply version and node pool changes
    async fn update_cluster(&self, spec: &ProvisionSpec) -> Result<()>;

    /// Tear a cluster down
    async fn delete_cluster(&self, name: &str, location: &str) -> Result<()>;

    /// Current remote state
    async fn cluster_state(&self, name: &str, location: &str) -> Result<RemoteClusterState>;

    /// Admin kubeconfig of a running cluster
    async fn kubeconfig(&self, name: &str, location: &str) -> Result<Vec<u8>>;
}

/// Builds provider clients from cluster credentials
#[cfg_attr(test, automock)]
pub trait ProviderClientFactory: Send + Sync {
    /// Build a client for a variant using its (already validated) primary secret
    fn client(&self, kind: ClusterKind, secret: &SecretItem) -> Result<Arc<dyn ManagedKubernetes>>;
}
